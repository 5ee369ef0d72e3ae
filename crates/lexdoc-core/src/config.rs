use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::status::TrackerConfig;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Application paths
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory (~/.local/share/lexdoc)
    pub data_dir: PathBuf,
    /// Persisted settings (JSON)
    pub settings_file: PathBuf,
}

impl Config {
    /// Load configuration or use defaults
    pub fn load_or_default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lexdoc");

        Self {
            settings_file: data_dir.join("settings.json"),
            data_dir,
        }
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// User-tunable settings, persisted as JSON.
///
/// Timings default to the values the product shipped with (3s reconnect,
/// 5s poll) and are meant to be tuned, not relied on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub backend_url: String,
    /// Push channel base URL; derived from `backend_url` when unset
    pub ws_url: Option<String>,
    pub reconnect_delay_ms: u64,
    pub poll_interval_ms: u64,
    /// Maximum documents in one comparison
    pub compare_cap: usize,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            ws_url: None,
            reconnect_delay_ms: 3_000,
            poll_interval_ms: 5_000,
            compare_cap: 5,
            request_timeout_secs: 60,
        }
    }
}

impl Settings {
    /// Load settings from disk, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read settings");
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Invalid settings file, using defaults");
                Self::default()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `LEXDOC_BACKEND_URL` / `LEXDOC_WS_URL` from the environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var("LEXDOC_BACKEND_URL").ok(),
            std::env::var("LEXDOC_WS_URL").ok(),
        )
    }

    fn with_overrides(mut self, backend_url: Option<String>, ws_url: Option<String>) -> Self {
        if let Some(url) = backend_url.filter(|u| !u.trim().is_empty()) {
            self.backend_url = url;
        }
        if let Some(url) = ws_url.filter(|u| !u.trim().is_empty()) {
            self.ws_url = Some(url);
        }
        self
    }

    /// Backend base URL without a trailing slash.
    pub fn backend_base(&self) -> String {
        self.backend_url.trim_end_matches('/').to_string()
    }

    /// Push channel base URL (`ws://` / `wss://`).
    pub fn ws_base(&self) -> Result<String> {
        if let Some(ref url) = self.ws_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        let base = self.backend_base();
        if let Some(rest) = base.strip_prefix("https://") {
            Ok(format!("wss://{}", rest))
        } else if let Some(rest) = base.strip_prefix("http://") {
            Ok(format!("ws://{}", rest))
        } else {
            Err(Error::Config(format!(
                "backend_url must start with http:// or https://, got '{}'",
                self.backend_url
            )))
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
