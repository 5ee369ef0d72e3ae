//! Lexdoc Core - document readiness for the legal document assistant
//!
//! This crate contains the client-side core of the upload-and-chat flow:
//! - Upload coordination (single and comparison batches)
//! - Readiness tracking over a push channel with poll fallback
//! - Action gating on readiness
//! - The backend REST client and authentication context

pub mod actions;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod status;
pub mod upload;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_support;

pub use actions::Actions;
pub use auth::{AuthContext, StaticToken, TokenProvider};
pub use backend::{Backend, HttpBackend};
pub use config::{Config, Settings};
pub use error::{Error, Result};
pub use models::{Artifact, ArtifactKind, Document, DocumentSet, LocalFile, Readiness, UploadMode};
pub use status::{
    ChannelEmitter, NoOpEmitter, StatusEmitter, StatusEvent, StatusTracker, TrackerConfig,
};
pub use upload::{Selection, Submission, UploadCoordinator, UploadReport};
pub use workspace::Workspace;
