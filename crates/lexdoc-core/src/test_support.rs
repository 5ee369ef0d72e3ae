//! Scripted collaborators for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::backend::{Answer, Backend, SessionRequest, SourceSnippet, UploadAccepted};
use crate::error::{Error, Result};
use crate::models::{Artifact, LocalFile};
use crate::status::{StatusChannel, StatusEmitter, StatusEvent, StatusPoller, StatusStream, StatusUpdate};

/// Let spawned tasks run until idle (paused clock auto-advances by 1ms).
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub(crate) type PushSender = mpsc::UnboundedSender<Result<StatusUpdate>>;

/// Push channel whose connections are scripted per document.
///
/// Each `script()` call queues one successful connection; connects beyond the
/// script are refused. Dropping the returned sender closes that connection.
#[derive(Default)]
pub(crate) struct MockChannel {
    scripted: Mutex<HashMap<String, VecDeque<mpsc::UnboundedReceiver<Result<StatusUpdate>>>>>,
    connects: Mutex<HashMap<String, usize>>,
    open: Arc<AtomicUsize>,
}

impl MockChannel {
    pub fn script(&self, doc_id: &str) -> PushSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripted
            .lock()
            .unwrap()
            .entry(doc_id.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn connects(&self, doc_id: &str) -> usize {
        self.connects
            .lock()
            .unwrap()
            .get(doc_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_connects(&self) -> usize {
        self.connects.lock().unwrap().values().sum()
    }

    /// Connections handed out and not yet dropped.
    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusChannel for MockChannel {
    async fn connect(&self, doc_id: &str) -> Result<StatusStream> {
        *self
            .connects
            .lock()
            .unwrap()
            .entry(doc_id.to_string())
            .or_default() += 1;

        let rx = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(doc_id)
            .and_then(|queue| queue.pop_front());

        match rx {
            Some(rx) => {
                self.open.fetch_add(1, Ordering::SeqCst);
                Ok(GaugedStream {
                    inner: UnboundedReceiverStream::new(rx),
                    open: self.open.clone(),
                }
                .boxed())
            }
            None => Err(Error::Channel("connection refused".to_string())),
        }
    }
}

/// Stream wrapper that decrements the open-connection gauge on drop.
struct GaugedStream {
    inner: UnboundedReceiverStream<Result<StatusUpdate>>,
    open: Arc<AtomicUsize>,
}

impl Stream for GaugedStream {
    type Item = Result<StatusUpdate>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for GaugedStream {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Poll fallback answering `processing` unless told otherwise.
#[derive(Default)]
pub(crate) struct MockPoller {
    responses: Mutex<HashMap<String, StatusUpdate>>,
    polls: Mutex<HashMap<String, usize>>,
    held: AtomicBool,
    released: Notify,
}

impl MockPoller {
    pub fn respond(&self, doc_id: &str, update: StatusUpdate) {
        self.responses
            .lock()
            .unwrap()
            .insert(doc_id.to_string(), update);
    }

    pub fn polls(&self, doc_id: &str) -> usize {
        self.polls.lock().unwrap().get(doc_id).copied().unwrap_or(0)
    }

    pub fn total_polls(&self) -> usize {
        self.polls.lock().unwrap().values().sum()
    }

    /// Requests started from now on hang until `release()`.
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.released.notify_waiters();
    }
}

#[async_trait]
impl StatusPoller for MockPoller {
    async fn fetch_status(&self, doc_id: &str) -> Result<StatusUpdate> {
        *self
            .polls
            .lock()
            .unwrap()
            .entry(doc_id.to_string())
            .or_default() += 1;
        if self.held.load(Ordering::SeqCst) {
            self.released.notified().await;
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(doc_id)
            .cloned()
            .unwrap_or_else(|| StatusUpdate::new("processing")))
    }
}

/// Emitter that keeps every event.
#[derive(Default)]
pub(crate) struct RecordingEmitter {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn became_ready(&self, doc_id: &str) -> usize {
        self.count(|e| matches!(e, StatusEvent::BecameReady { doc_id: id } if id == doc_id))
    }

    pub fn reconnects_scheduled(&self, doc_id: &str) -> usize {
        self.count(
            |e| matches!(e, StatusEvent::ReconnectScheduled { doc_id: id, .. } if id == doc_id),
        )
    }

    fn count(&self, pred: impl Fn(&StatusEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl StatusEmitter for RecordingEmitter {
    fn emit(&self, event: StatusEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Backend that accepts uploads as `doc-{file name}` unless told to fail.
#[derive(Default)]
pub(crate) struct MockBackend {
    failing: Mutex<HashSet<String>>,
    /// Uploads wait here until every upload of the batch has started
    barrier: Mutex<Option<Arc<tokio::sync::Barrier>>>,
    uploads: AtomicUsize,
    sessions: Mutex<Vec<SessionRequest>>,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn fail_upload(&self, file_name: &str) {
        self.failing.lock().unwrap().insert(file_name.to_string());
    }

    pub fn require_concurrent_uploads(&self, count: usize) {
        *self.barrier.lock().unwrap() = Some(Arc::new(tokio::sync::Barrier::new(count)));
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> Vec<SessionRequest> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub(crate) fn doc_id_for(file_name: &str) -> String {
    format!("doc-{}", file_name)
}

#[async_trait]
impl Backend for MockBackend {
    async fn upload(&self, file: &LocalFile) -> Result<UploadAccepted> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let barrier = self.barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        if self.failing.lock().unwrap().contains(&file.name) {
            return Err(Error::Backend {
                status: 500,
                message: "Upload failed".to_string(),
            });
        }
        Ok(UploadAccepted {
            id: doc_id_for(&file.name),
            status: Some("uploaded".to_string()),
        })
    }

    async fn reprocess(&self, doc_id: &str) -> Result<()> {
        self.record(format!("reprocess:{doc_id}"));
        Ok(())
    }

    async fn create_session(&self, request: &SessionRequest) -> Result<String> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.push(request.clone());
        Ok(format!("session-{}", sessions.len()))
    }

    async fn ask(&self, doc_id: &str, question: &str) -> Result<Answer> {
        self.record(format!("ask:{doc_id}"));
        Ok(Answer {
            answer: format!("Answer to: {question}"),
            sources: vec![SourceSnippet {
                document_id: doc_id.to_string(),
                snippet: "Clause 4.2".to_string(),
            }],
        })
    }

    async fn summarize(&self, doc_id: &str) -> Result<String> {
        self.record(format!("summarize:{doc_id}"));
        Ok("Twelve month lease".to_string())
    }

    async fn analyze(&self, doc_id: &str) -> Result<serde_json::Value> {
        self.record(format!("analyze:{doc_id}"));
        Ok(serde_json::json!({ "risks": [{ "label": "Auto-renewal" }] }))
    }

    async fn compare(&self, doc_ids: &[String]) -> Result<serde_json::Value> {
        self.record(format!("compare:{}", doc_ids.join(",")));
        Ok(serde_json::json!({ "documents": doc_ids }))
    }

    async fn export_pdf(&self, artifact: &Artifact) -> Result<Bytes> {
        self.record(format!("export:{}", artifact.kind));
        Ok(Bytes::from_static(b"%PDF-1.7"))
    }
}
