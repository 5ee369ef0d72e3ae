//! Error types for lexdoc-core.
//!
//! Every async call site maps its own failure into one of these variants and
//! reports it at the boundary. Nothing is retried silently except the
//! transient push/poll failures owned by the status worker.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Submit was requested with an empty selection
    #[error("No file selected")]
    NoFileSelected,

    /// No identity token is available
    #[error("Not signed in")]
    NotAuthenticated,

    /// A single file's upload was rejected or never reached the backend
    #[error("Upload of '{file}' failed: {cause}")]
    UploadFailed { file: String, cause: String },

    /// Too few uploads succeeded to open a comparison session
    #[error("Comparison needs {required} uploaded documents, only {succeeded} succeeded")]
    InsufficientForComparison { succeeded: usize, required: usize },

    /// Compare mode was submitted before enough files were selected
    #[error("Comparison needs at least {required} files, {selected} selected")]
    TooFewFiles { selected: usize, required: usize },

    /// A user action was invoked while its gate is closed
    #[error("{action} is not available: {reason}")]
    ActionNotPermitted { action: String, reason: String },

    #[error("Document is not tracked: {0}")]
    NotTracked(String),

    #[error("Invalid readiness transition for {doc_id}: {from} -> {to}")]
    InvalidTransition {
        doc_id: String,
        from: String,
        to: String,
    },

    /// Non-2xx response from the backend
    #[error("Backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Push channel connect/read failure
    #[error("Status channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn upload_failed(file: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::UploadFailed {
            file: file.into(),
            cause: cause.to_string(),
        }
    }

    pub fn not_permitted(action: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::ActionNotPermitted {
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure is transient I/O that the status worker recovers from.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Channel(_) | Self::Io(_) => true,
            Self::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
