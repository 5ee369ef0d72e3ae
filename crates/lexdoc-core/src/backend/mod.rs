//! Backend REST collaborator.
//!
//! The backend owns parsing, embedding, LLM calls and PDF export. This module
//! only describes the calls the client makes; [`HttpBackend`] is the reqwest
//! implementation.

mod http;

pub use http::{ChatMessage, HttpBackend, MessageReply, SessionDetail, SessionSummary};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Artifact, LocalFile};

/// Response to an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadAccepted {
    #[serde(alias = "document_id")]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Session to open once uploads are in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    Single { document_id: String },
    Comparison { document_ids: Vec<String>, title: String },
}

impl SessionRequest {
    pub fn single(document_id: impl Into<String>) -> Self {
        Self::Single {
            document_id: document_id.into(),
        }
    }

    pub fn comparison(document_ids: Vec<String>) -> Self {
        let title = format!("Document Comparison ({} docs)", document_ids.len());
        Self::Comparison {
            document_ids,
            title,
        }
    }

    /// JSON body for `POST /api/chat/session`.
    pub fn body(&self) -> serde_json::Value {
        match self {
            Self::Single { document_id } => serde_json::json!({ "documentId": document_id }),
            Self::Comparison {
                document_ids,
                title,
            } => serde_json::json!({
                "type": "comparison",
                "documentIds": document_ids,
                "title": title,
            }),
        }
    }
}

/// Answer to a question about one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceSnippet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnippet {
    pub document_id: String,
    pub snippet: String,
}

/// Backend calls made by the upload coordinator and gated actions.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn upload(&self, file: &LocalFile) -> Result<UploadAccepted>;

    /// Ask the backend to process a document again.
    async fn reprocess(&self, doc_id: &str) -> Result<()>;

    /// Returns the new session id.
    async fn create_session(&self, request: &SessionRequest) -> Result<String>;

    async fn ask(&self, doc_id: &str, question: &str) -> Result<Answer>;

    async fn summarize(&self, doc_id: &str) -> Result<String>;

    /// Risk analysis for one document.
    async fn analyze(&self, doc_id: &str) -> Result<serde_json::Value>;

    async fn compare(&self, doc_ids: &[String]) -> Result<serde_json::Value>;

    /// Render an artifact as PDF.
    async fn export_pdf(&self, artifact: &Artifact) -> Result<Bytes>;
}
