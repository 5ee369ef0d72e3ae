//! Upload coordination.
//!
//! Turns a batch of selected files into backend document ids, hands every
//! accepted id to the [`StatusTracker`], and decides whether a single-document
//! or comparison session follows.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;

use crate::auth::AuthContext;
use crate::backend::{Backend, SessionRequest};
use crate::error::{Error, Result};
use crate::models::{self, Document, DocumentSet, LocalFile, UploadMode};
use crate::status::StatusTracker;

/// Outcome of a `select_files` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Names added to the selection
    pub accepted: Vec<String>,
    /// Names dropped because the selection was full
    pub dropped: Vec<String>,
    /// Names refused because their type is not accepted
    pub rejected: Vec<String>,
}

/// Fan-in result of one upload batch.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Documents the backend accepted, now in `processing`
    pub documents: Vec<Document>,
    /// One `UploadFailed` per rejected file
    pub failures: Vec<Error>,
}

impl UploadReport {
    pub fn succeeded(&self) -> usize {
        self.documents.len()
    }

    fn ids(&self) -> Vec<String> {
        self.documents.iter().filter_map(|d| d.id.clone()).collect()
    }
}

/// Result of a successful submit.
#[derive(Debug)]
pub struct Submission {
    pub session_id: String,
    pub documents: Vec<Document>,
    /// Files that failed while the rest of the batch went through
    pub failures: Vec<Error>,
}

#[derive(Debug)]
struct Pending {
    mode: UploadMode,
    files: Vec<LocalFile>,
}

/// Owns document creation and the `uploading -> processing` transition.
#[derive(Clone)]
pub struct UploadCoordinator {
    auth: AuthContext,
    cap: usize,
    pending: Arc<RwLock<Pending>>,
    documents: Arc<RwLock<Vec<Document>>>,
    /// Backend ids of the last comparison batch, in upload order
    comparison: Arc<RwLock<Vec<String>>>,
}

impl UploadCoordinator {
    /// `cap` is the most files a comparison may hold.
    pub fn new(auth: AuthContext, cap: usize) -> Self {
        Self {
            auth,
            cap: cap.max(DocumentSet::MIN_MEMBERS),
            pending: Arc::new(RwLock::new(Pending {
                mode: UploadMode::Single,
                files: Vec::new(),
            })),
            documents: Arc::new(RwLock::new(Vec::new())),
            comparison: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add files to the selection.
    ///
    /// In single mode the first file replaces whatever was selected. In compare
    /// mode files accumulate up to the cap and the rest of the batch is dropped.
    /// Unsupported file types are rejected. Switching mode starts a fresh
    /// selection.
    pub async fn select_files(&self, files: Vec<LocalFile>, mode: UploadMode) -> Selection {
        let mut pending = self.pending.write().await;
        if pending.mode != mode {
            pending.files.clear();
            pending.mode = mode;
        }

        let room = match mode {
            UploadMode::Single => {
                if files.iter().any(|f| models::is_supported(&f.name)) {
                    pending.files.clear();
                }
                1usize.saturating_sub(pending.files.len())
            }
            UploadMode::Compare => self.cap.saturating_sub(pending.files.len()),
        };

        let mut selection = Selection::default();
        for file in files {
            if !models::is_supported(&file.name) {
                selection.rejected.push(file.name);
            } else if selection.accepted.len() < room {
                selection.accepted.push(file.name.clone());
                pending.files.push(file);
            } else {
                selection.dropped.push(file.name);
            }
        }

        if !selection.rejected.is_empty() {
            tracing::warn!(
                rejected = ?selection.rejected,
                "Unsupported file types, expected one of {:?}",
                models::SUPPORTED_EXTENSIONS
            );
        }
        if !selection.dropped.is_empty() {
            tracing::warn!(
                ?mode,
                cap = self.cap,
                dropped = selection.dropped.len(),
                "Selection full, dropping files"
            );
        }
        selection
    }

    pub async fn mode(&self) -> UploadMode {
        self.pending.read().await.mode
    }

    /// Names of the files waiting to be uploaded.
    pub async fn selected(&self) -> Vec<String> {
        self.pending
            .read()
            .await
            .files
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    pub async fn clear_selection(&self) {
        self.pending.write().await.files.clear();
    }

    /// Every document created so far, including failed uploads.
    pub async fn documents(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    /// Ids uploaded by the last comparison submit that met its quorum.
    pub async fn comparison_batch(&self) -> Vec<String> {
        self.comparison.read().await.clone()
    }

    /// Upload the selection concurrently and track every accepted document.
    ///
    /// A failed file never cancels its siblings. It stays in the document list
    /// in `error` with no id and is reported in [`UploadReport::failures`].
    pub async fn upload(
        &self,
        backend: &dyn Backend,
        tracker: &StatusTracker,
    ) -> Result<UploadReport> {
        if self.pending.read().await.files.is_empty() {
            return Err(Error::NoFileSelected);
        }
        if !self.auth.is_signed_in().await {
            return Err(Error::NotAuthenticated);
        }

        let files = std::mem::take(&mut self.pending.write().await.files);
        if files.is_empty() {
            return Err(Error::NoFileSelected);
        }

        let local_ids: Vec<String> = {
            let mut documents = self.documents.write().await;
            files
                .iter()
                .map(|file| {
                    let doc = Document::uploading(&file.name);
                    let local_id = doc.local_id.clone();
                    documents.push(doc);
                    local_id
                })
                .collect()
        };

        tracing::info!(files = files.len(), "Uploading batch");
        let results = join_all(files.iter().map(|file| backend.upload(file))).await;

        let mut report = UploadReport::default();
        for ((file, local_id), result) in files.iter().zip(&local_ids).zip(results) {
            match result {
                Ok(accepted) => {
                    let doc = self
                        .update(local_id, |doc| doc.accept(accepted.id.clone()))
                        .await;
                    if !tracker.track(&accepted.id).await {
                        tracing::debug!(doc_id = %accepted.id, "Upload finished after tracking stopped");
                    }
                    report.documents.extend(doc);
                }
                Err(e) => {
                    tracing::warn!(file = %file.name, error = %e, "Upload failed");
                    self.update(local_id, |doc| doc.reject(e.to_string())).await;
                    report.failures.push(Error::upload_failed(&file.name, e));
                }
            }
        }

        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failures.len(),
            "Upload batch finished"
        );
        Ok(report)
    }

    /// Validate, upload, apply the completion policy and open the session.
    pub async fn submit(
        &self,
        backend: &dyn Backend,
        tracker: &StatusTracker,
    ) -> Result<Submission> {
        let (mode, selected) = {
            let pending = self.pending.read().await;
            (pending.mode, pending.files.len())
        };

        if selected == 0 {
            return Err(Error::NoFileSelected);
        }
        if mode == UploadMode::Compare && selected < DocumentSet::MIN_MEMBERS {
            return Err(Error::TooFewFiles {
                selected,
                required: DocumentSet::MIN_MEMBERS,
            });
        }

        let mut report = self.upload(backend, tracker).await?;

        let request = match mode {
            UploadMode::Compare => {
                if report.succeeded() < DocumentSet::MIN_MEMBERS {
                    tracing::warn!(
                        succeeded = report.succeeded(),
                        "Not enough uploads for a comparison"
                    );
                    return Err(Error::InsufficientForComparison {
                        succeeded: report.succeeded(),
                        required: DocumentSet::MIN_MEMBERS,
                    });
                }
                let ids = report.ids();
                *self.comparison.write().await = ids.clone();
                SessionRequest::comparison(ids)
            }
            UploadMode::Single => match report.ids().into_iter().next() {
                Some(id) => SessionRequest::single(id),
                None if !report.failures.is_empty() => return Err(report.failures.remove(0)),
                None => return Err(Error::NoFileSelected),
            },
        };

        let session_id = backend.create_session(&request).await?;
        Ok(Submission {
            session_id,
            documents: report.documents,
            failures: report.failures,
        })
    }

    /// Apply `f` to the document with `local_id` and return its new value.
    async fn update(&self, local_id: &str, f: impl FnOnce(&mut Document)) -> Option<Document> {
        let mut documents = self.documents.write().await;
        let doc = documents.iter_mut().find(|d| d.local_id == local_id)?;
        f(doc);
        Some(doc.clone())
    }
}
