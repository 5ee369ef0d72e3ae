//! Client-side document model.

use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Readiness of a document as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    /// Accepted locally, upload request in flight
    Uploading,
    /// Backend accepted the upload and is processing it
    Processing,
    Ready,
    Error,
}

impl Readiness {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Readiness::Ready | Readiness::Error)
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Readiness::Uploading => write!(f, "uploading"),
            Readiness::Processing => write!(f, "processing"),
            Readiness::Ready => write!(f, "ready"),
            Readiness::Error => write!(f, "error"),
        }
    }
}

/// One uploaded file undergoing backend processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Client-side key, stable before the backend assigns an id
    pub local_id: String,
    /// Backend id; `None` until the upload succeeds
    pub id: Option<String>,
    /// Original filename, not guaranteed unique
    pub display_name: String,
    pub readiness: Readiness,
    pub status_message: String,
}

impl Document {
    /// New document in `uploading`.
    pub fn uploading(display_name: impl Into<String>) -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            id: None,
            display_name: display_name.into(),
            readiness: Readiness::Uploading,
            status_message: String::new(),
        }
    }

    /// `uploading -> processing` once the backend returns an id.
    pub(crate) fn accept(&mut self, id: String) {
        self.id = Some(id);
        self.readiness = Readiness::Processing;
        self.status_message.clear();
    }

    /// Upload was rejected; the document never gets an id.
    pub(crate) fn reject(&mut self, cause: impl Into<String>) {
        self.readiness = Readiness::Error;
        self.status_message = cause.into();
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }
}

/// Ordered set of documents used for comparison mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSet {
    members: Vec<Document>,
}

impl DocumentSet {
    /// Minimum number of documents in a comparison.
    pub const MIN_MEMBERS: usize = 2;

    /// Build a set, keeping at most `cap` members.
    pub fn new(members: Vec<Document>, cap: usize) -> Self {
        let mut members = members;
        if members.len() > cap {
            tracing::warn!(
                count = members.len(),
                cap,
                "Document set exceeds comparison cap, truncating"
            );
            members.truncate(cap);
        }
        Self { members }
    }

    pub fn members(&self) -> &[Document] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Backend ids of members that have one.
    pub fn ids(&self) -> Vec<String> {
        self.members.iter().filter_map(|d| d.id.clone()).collect()
    }

    /// Every member is `ready` and there are at least two of them.
    pub fn is_compare_ready(&self) -> bool {
        self.members.len() >= Self::MIN_MEMBERS && self.members.iter().all(Document::is_ready)
    }
}

/// How selected files are turned into a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// One document, one chat session
    Single,
    /// Two or more documents, one comparison session
    Compare,
}

/// A file picked by the user, held in memory until uploaded.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub bytes: Bytes,
    pub mime: String,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let mime = guess_mime(&name).to_string();
        Self {
            name,
            bytes: bytes.into(),
            mime,
        }
    }

    /// Read a file from disk.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        Ok(Self::new(name, bytes))
    }
}

/// Extensions accepted for upload.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "txt", "png", "jpg", "jpeg"];

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether `name` has an extension the backend can process.
pub fn is_supported(name: &str) -> bool {
    extension(name).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// MIME type for the file types the product accepts.
pub fn guess_mime(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Kind of result the backend produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Summary,
    Analysis,
    Comparison,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Summary => write!(f, "summary"),
            ArtifactKind::Analysis => write!(f, "analysis"),
            ArtifactKind::Comparison => write!(f, "comparison"),
        }
    }
}

/// An already-produced summary, analysis or comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub document_ids: Vec<String>,
    pub body: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, document_ids: Vec<String>, body: serde_json::Value) -> Self {
        Self {
            kind,
            document_ids,
            body,
            created_at: Utc::now(),
        }
    }
}
