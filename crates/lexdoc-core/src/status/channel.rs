//! Status sources: the push channel and the poll fallback.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

use super::types::StatusUpdate;

/// Stream of status updates for one document. Ends when the channel closes.
pub type StatusStream = BoxStream<'static, Result<StatusUpdate>>;

/// Duplex status channel, one logical connection per document.
#[async_trait]
pub trait StatusChannel: Send + Sync {
    /// Open the channel for `doc_id`. Dropping the stream closes it.
    async fn connect(&self, doc_id: &str) -> Result<StatusStream>;
}

/// Pull fallback for document status.
#[async_trait]
pub trait StatusPoller: Send + Sync {
    async fn fetch_status(&self, doc_id: &str) -> Result<StatusUpdate>;
}

/// Frame pushed by the backend.
#[derive(Debug, Deserialize)]
struct PushFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

const STATUS_UPDATE_FRAME: &str = "status_update";

/// Decode a text frame into a status update.
///
/// Frames of other types, frames for another document and unparseable frames
/// are skipped.
fn parse_frame(doc_id: &str, text: &str) -> Option<StatusUpdate> {
    let frame: PushFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(doc_id = %doc_id, error = %e, "Unparseable status frame");
            return None;
        }
    };

    if frame.kind != STATUS_UPDATE_FRAME {
        tracing::debug!(doc_id = %doc_id, kind = %frame.kind, "Skipping frame");
        return None;
    }
    if frame.document_id.as_deref().is_some_and(|id| id != doc_id) {
        tracing::debug!(doc_id = %doc_id, "Skipping frame for another document");
        return None;
    }

    let status = frame.status?;
    Some(StatusUpdate {
        status,
        message: frame.message,
    })
}

/// WebSocket push channel at `{base_url}/ws/{doc_id}`.
pub struct WsStatusChannel {
    base_url: String,
}

impl WsStatusChannel {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, doc_id: &str) -> String {
        format!("{}/ws/{}", self.base_url, doc_id)
    }
}

#[async_trait]
impl StatusChannel for WsStatusChannel {
    async fn connect(&self, doc_id: &str) -> Result<StatusStream> {
        let url = self.url_for(doc_id);
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::Channel(e.to_string()))?;

        tracing::debug!(doc_id = %doc_id, url = %url, "Status channel connected");

        let doc_id = doc_id.to_string();
        let stream = socket.filter_map(move |frame| {
            let update = match frame {
                Ok(Message::Text(text)) => parse_frame(&doc_id, &text).map(Ok),
                Ok(_) => None,
                Err(e) => Some(Err(Error::Channel(e.to_string()))),
            };
            futures::future::ready(update)
        });

        Ok(stream.boxed())
    }
}
