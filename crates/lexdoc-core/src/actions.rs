//! Backend calls behind the action gate.

use std::sync::Arc;

use bytes::Bytes;

use crate::backend::{Answer, Backend};
use crate::error::{Error, Result};
use crate::gate::{self, Action};
use crate::models::{Artifact, ArtifactKind, Document, DocumentSet};

/// Runs user actions, refusing any whose gate is closed.
#[derive(Clone)]
pub struct Actions {
    backend: Arc<dyn Backend>,
}

impl Actions {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn ask(&self, doc: &Document, question: &str) -> Result<Answer> {
        let doc_id = require(Action::Ask, doc)?;
        tracing::debug!(doc_id = %doc_id, "Asking question");
        self.backend.ask(doc_id, question).await
    }

    pub async fn summarize(&self, doc: &Document) -> Result<Artifact> {
        let doc_id = require(Action::Summarize, doc)?;
        let summary = self.backend.summarize(doc_id).await?;
        Ok(Artifact::new(
            ArtifactKind::Summary,
            vec![doc_id.to_string()],
            serde_json::json!({ "summary": summary }),
        ))
    }

    pub async fn analyze(&self, doc: &Document) -> Result<Artifact> {
        let doc_id = require(Action::Analyze, doc)?;
        let analysis = self.backend.analyze(doc_id).await?;
        Ok(Artifact::new(
            ArtifactKind::Analysis,
            vec![doc_id.to_string()],
            analysis,
        ))
    }

    pub async fn compare(&self, set: &DocumentSet) -> Result<Artifact> {
        if !gate::can_compare(set) {
            let reason = if set.len() < DocumentSet::MIN_MEMBERS {
                format!(
                    "needs at least {} documents, {} present",
                    DocumentSet::MIN_MEMBERS,
                    set.len()
                )
            } else {
                let waiting = set.members().iter().filter(|d| !d.is_ready()).count();
                format!("{} of {} documents are not ready", waiting, set.len())
            };
            return Err(Error::not_permitted("Compare", reason));
        }

        let ids = set.ids();
        tracing::info!(documents = ids.len(), "Comparing documents");
        let comparison = self.backend.compare(&ids).await?;
        Ok(Artifact::new(ArtifactKind::Comparison, ids, comparison))
    }

    pub async fn export(&self, artifact: Option<&Artifact>) -> Result<Bytes> {
        match artifact {
            Some(artifact) if gate::can_export(Some(artifact)) => {
                self.backend.export_pdf(artifact).await
            }
            _ => Err(Error::not_permitted("Export", "nothing to export yet")),
        }
    }
}

/// Backend id of `doc` if `action` is open for it.
fn require(action: Action, doc: &Document) -> Result<&str> {
    if !action.is_permitted(doc) {
        return Err(Error::not_permitted(action, gate::closed_reason(doc)));
    }
    doc.id
        .as_deref()
        .ok_or_else(|| Error::not_permitted(action, "document has no backend id"))
}
