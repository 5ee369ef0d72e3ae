//! The owning context for one upload-and-chat flow.

use std::sync::Arc;

use crate::actions::Actions;
use crate::auth::AuthContext;
use crate::backend::{Backend, HttpBackend};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{Document, DocumentSet, LocalFile, Readiness, UploadMode};
use crate::status::{
    StatusChannel, StatusEmitter, StatusPoller, StatusTracker, WsStatusChannel,
};
use crate::upload::{Selection, Submission, UploadCoordinator};

/// Shared state of an upload flow
pub struct Workspace {
    pub auth: AuthContext,
    backend: Arc<dyn Backend>,
    uploads: UploadCoordinator,
    tracker: Arc<StatusTracker>,
    actions: Actions,
    compare_cap: usize,
}

impl Workspace {
    pub fn new(
        settings: &Settings,
        auth: AuthContext,
        backend: Arc<dyn Backend>,
        channel: Arc<dyn StatusChannel>,
        poller: Arc<dyn StatusPoller>,
        emitter: Arc<dyn StatusEmitter>,
    ) -> Self {
        let tracker = StatusTracker::new(channel, poller, emitter, settings.tracker_config());
        Self {
            uploads: UploadCoordinator::new(auth.clone(), settings.compare_cap),
            actions: Actions::new(backend.clone()),
            auth,
            backend,
            tracker: Arc::new(tracker),
            compare_cap: settings.compare_cap,
        }
    }

    /// Wire the HTTP backend and WebSocket channel from settings.
    pub fn connect(
        settings: &Settings,
        auth: AuthContext,
        emitter: Arc<dyn StatusEmitter>,
    ) -> Result<Self> {
        let http = Arc::new(HttpBackend::new(settings, auth.clone())?);
        let channel = Arc::new(WsStatusChannel::new(settings.ws_base()?));
        tracing::info!(backend = %settings.backend_base(), "Workspace connected");
        Ok(Self::new(
            settings,
            auth,
            http.clone(),
            channel,
            http,
            emitter,
        ))
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    pub async fn select_files(&self, files: Vec<LocalFile>, mode: UploadMode) -> Selection {
        self.uploads.select_files(files, mode).await
    }

    pub async fn submit(&self) -> Result<Submission> {
        self.uploads
            .submit(self.backend.as_ref(), &self.tracker)
            .await
    }

    /// Coordinator documents with tracker readiness merged in.
    pub async fn documents(&self) -> Vec<Document> {
        let records = self.tracker.snapshot().await;
        self.uploads
            .documents()
            .await
            .into_iter()
            .map(|mut doc| {
                if let Some(record) = doc.id.as_ref().and_then(|id| records.get(id)) {
                    doc.readiness = record.readiness;
                    doc.status_message = record.message.clone();
                }
                doc
            })
            .collect()
    }

    pub async fn document(&self, doc_id: &str) -> Option<Document> {
        self.documents()
            .await
            .into_iter()
            .find(|d| d.id.as_deref() == Some(doc_id))
    }

    /// The last comparison batch as a set, in upload order.
    ///
    /// Failed uploads of that batch have no id and are left out. Empty until a
    /// comparison submit meets its quorum.
    pub async fn document_set(&self) -> DocumentSet {
        let batch = self.uploads.comparison_batch().await;
        let documents = self.documents().await;
        let members = batch
            .iter()
            .filter_map(|id| {
                documents
                    .iter()
                    .find(|d| d.id.as_deref() == Some(id.as_str()))
                    .cloned()
            })
            .collect();
        DocumentSet::new(members, self.compare_cap)
    }

    /// Explicit user retry of a failed document.
    pub async fn retry(&self, doc_id: &str) -> Result<()> {
        match self.tracker.readiness(doc_id).await {
            None => return Err(Error::NotTracked(doc_id.to_string())),
            Some(Readiness::Error) => {}
            Some(other) => {
                return Err(Error::InvalidTransition {
                    doc_id: doc_id.to_string(),
                    from: other.to_string(),
                    to: Readiness::Processing.to_string(),
                })
            }
        }

        self.backend.reprocess(doc_id).await?;
        self.tracker.retry(doc_id).await
    }

    /// Close every channel and timer. The workspace tracks nothing afterwards.
    pub async fn unmount(&self) {
        self.tracker.shutdown().await;
        tracing::info!("Workspace unmounted");
    }
}
