//! Status tracking types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::Readiness;

/// A status report from either source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn kind(&self) -> StatusKind {
        classify(&self.status)
    }
}

/// Which source delivered an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Push,
    Poll,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Push => write!(f, "push"),
            Source::Poll => write!(f, "poll"),
        }
    }
}

/// Normalized meaning of a backend status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Ready,
    Failed,
    /// Anything non-terminal, including unrecognized values
    Progress,
}

/// Map the backend's status vocabulary onto [`StatusKind`].
///
/// `processed_with_summary_error` means chunks and embeddings were stored and
/// only the summary step failed, so the document can be used.
pub fn classify(status: &str) -> StatusKind {
    match status.trim().to_ascii_lowercase().as_str() {
        "complete" | "processed" | "ready" | "processed_with_summary_error" => StatusKind::Ready,
        "error" | "failed" => StatusKind::Failed,
        _ => StatusKind::Progress,
    }
}

/// Push channel state for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Authoritative readiness record for one tracked document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub doc_id: String,
    pub readiness: Readiness,
    pub message: String,
    pub connection: ConnectionState,
}

impl DocumentStatus {
    /// Initial record, entered right after the upload is accepted.
    pub fn processing(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            readiness: Readiness::Processing,
            message: String::new(),
            connection: ConnectionState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }
}

/// Notifications emitted by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    ReadinessChanged {
        doc_id: String,
        readiness: Readiness,
        message: String,
    },
    MessageChanged {
        doc_id: String,
        message: String,
    },
    Connection {
        doc_id: String,
        state: ConnectionState,
    },
    ReconnectScheduled {
        doc_id: String,
        delay_ms: u64,
        attempt: u32,
    },
    /// Fired once, the first time a document reaches `ready`
    BecameReady { doc_id: String },
}

impl StatusEvent {
    pub fn doc_id(&self) -> &str {
        match self {
            StatusEvent::ReadinessChanged { doc_id, .. }
            | StatusEvent::MessageChanged { doc_id, .. }
            | StatusEvent::Connection { doc_id, .. }
            | StatusEvent::ReconnectScheduled { doc_id, .. }
            | StatusEvent::BecameReady { doc_id } => doc_id,
        }
    }
}

/// Receiver of tracker notifications.
pub trait StatusEmitter: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

/// No-op implementation for testing
pub struct NoOpEmitter;

impl StatusEmitter for NoOpEmitter {
    fn emit(&self, _event: StatusEvent) {}
}

impl<F> StatusEmitter for F
where
    F: Fn(StatusEvent) + Send + Sync,
{
    fn emit(&self, event: StatusEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded channel so none are dropped.
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusEmitter for ChannelEmitter {
    fn emit(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }
}

/// Timings for the push/poll sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Fixed delay before reconnecting a dropped push channel
    pub reconnect_delay: Duration,
    /// Poll fallback interval
    pub poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(5),
        }
    }
}
