//! Document readiness tracking.
//!
//! # Architecture
//!
//! ```text
//!  push channel (ws)        poll fallback (GET status)
//!        │                          │
//!        └──────────► WORKER ◄──────┘      one task per document id
//!                        │
//!                  reducer::reduce            pure, (state, source, update) -> state
//!                        │
//!                     records                 readiness per document id
//!                        │
//!              StatusEmitter events           ReadinessChanged / BecameReady / ...
//! ```
//!
//! The worker is the single writer of its document's record. It stops once
//! the document is terminal (`ready` / `error`), closing its push channel and
//! disarming the poll and reconnect timers. A retry restarts it.

mod channel;
mod reducer;
mod types;
mod worker;

pub use channel::{StatusChannel, StatusPoller, StatusStream, WsStatusChannel};
pub use reducer::{reduce, retry, with_connection, Effect, Transition};
pub use types::{
    classify, ChannelEmitter, ConnectionState, DocumentStatus, NoOpEmitter, Source,
    StatusEmitter, StatusEvent, StatusKind, StatusUpdate, TrackerConfig,
};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::models::Readiness;

use worker::{Records, Worker};

struct WorkerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps one authoritative readiness value per document id.
pub struct StatusTracker {
    channel: Arc<dyn StatusChannel>,
    poller: Arc<dyn StatusPoller>,
    emitter: Arc<dyn StatusEmitter>,
    config: TrackerConfig,
    records: Records,
    workers: Mutex<HashMap<String, WorkerHandle>>,
    cancel: CancellationToken,
}

impl StatusTracker {
    pub fn new(
        channel: Arc<dyn StatusChannel>,
        poller: Arc<dyn StatusPoller>,
        emitter: Arc<dyn StatusEmitter>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            channel,
            poller,
            emitter,
            config,
            records: Arc::new(RwLock::new(HashMap::new())),
            workers: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Start tracking a freshly accepted document in `processing`.
    ///
    /// Returns `false` if the id is already tracked or the tracker is shut down.
    pub async fn track(&self, doc_id: &str) -> bool {
        if self.cancel.is_cancelled() {
            tracing::warn!(doc_id = %doc_id, "Tracker is shut down, not tracking");
            return false;
        }

        {
            let mut records = self.records.write().await;
            if records.contains_key(doc_id) {
                tracing::debug!(doc_id = %doc_id, "Already tracking");
                return false;
            }
            records.insert(doc_id.to_string(), DocumentStatus::processing(doc_id));
        }

        self.emitter.emit(StatusEvent::ReadinessChanged {
            doc_id: doc_id.to_string(),
            readiness: Readiness::Processing,
            message: String::new(),
        });
        self.spawn_worker(doc_id).await;
        tracing::info!(doc_id = %doc_id, "Tracking document");
        true
    }

    /// Explicit retry: `error -> processing`, then restart the sources.
    pub async fn retry(&self, doc_id: &str) -> Result<()> {
        let next = {
            let mut records = self.records.write().await;
            let current = records
                .get(doc_id)
                .ok_or_else(|| Error::NotTracked(doc_id.to_string()))?;
            let next = reducer::retry(current).ok_or_else(|| Error::InvalidTransition {
                doc_id: doc_id.to_string(),
                from: current.readiness.to_string(),
                to: Readiness::Processing.to_string(),
            })?;
            records.insert(doc_id.to_string(), next.clone());
            next
        };

        self.emitter.emit(StatusEvent::ReadinessChanged {
            doc_id: doc_id.to_string(),
            readiness: next.readiness,
            message: next.message,
        });
        self.spawn_worker(doc_id).await;
        tracing::info!(doc_id = %doc_id, "Retrying document");
        Ok(())
    }

    /// Stop tracking and forget the document.
    pub async fn untrack(&self, doc_id: &str) {
        let worker = self.workers.lock().await.remove(doc_id);
        if let Some(worker) = worker {
            worker.cancel.cancel();
            let _ = worker.handle.await;
        }
        self.records.write().await.remove(doc_id);
    }

    pub async fn status(&self, doc_id: &str) -> Option<DocumentStatus> {
        self.records.read().await.get(doc_id).cloned()
    }

    pub async fn readiness(&self, doc_id: &str) -> Option<Readiness> {
        self.records.read().await.get(doc_id).map(|r| r.readiness)
    }

    /// Current record of every tracked document.
    pub async fn snapshot(&self) -> HashMap<String, DocumentStatus> {
        self.records.read().await.clone()
    }

    /// Number of workers still running.
    pub async fn live_workers(&self) -> usize {
        let mut workers = self.workers.lock().await;
        prune_finished(&mut workers);
        workers.len()
    }

    /// Cancel every worker and wait for them to exit.
    ///
    /// Afterwards no channel, poll timer or reconnect timer is left alive.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let workers: Vec<_> = self.workers.lock().await.drain().collect();
        let count = workers.len();
        for (_, worker) in workers {
            let _ = worker.handle.await;
        }
        tracing::info!(workers = count, "Status tracker shut down");
    }

    async fn spawn_worker(&self, doc_id: &str) {
        let cancel = self.cancel.child_token();
        let worker = Worker {
            doc_id: doc_id.to_string(),
            channel: self.channel.clone(),
            poller: self.poller.clone(),
            emitter: self.emitter.clone(),
            records: self.records.clone(),
            config: self.config,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run());

        let mut workers = self.workers.lock().await;
        prune_finished(&mut workers);
        let previous = workers.insert(doc_id.to_string(), WorkerHandle { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }
}

/// Drop handles of workers that already exited. Their records stay.
fn prune_finished(workers: &mut HashMap<String, WorkerHandle>) {
    workers.retain(|_, w| !w.handle.is_finished());
}

impl Drop for StatusTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::{settle, MockChannel, MockPoller, RecordingEmitter};

    struct Harness {
        tracker: StatusTracker,
        channel: Arc<MockChannel>,
        poller: Arc<MockPoller>,
        events: Arc<RecordingEmitter>,
    }

    fn harness(config: TrackerConfig) -> Harness {
        let channel = Arc::new(MockChannel::default());
        let poller = Arc::new(MockPoller::default());
        let events = Arc::new(RecordingEmitter::default());
        let tracker = StatusTracker::new(
            channel.clone(),
            poller.clone(),
            events.clone(),
            config,
        );
        Harness {
            tracker,
            channel,
            poller,
            events,
        }
    }

    fn slow_poll() -> TrackerConfig {
        TrackerConfig {
            reconnect_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(3600),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_ready_fires_callback_once() {
        let h = harness(slow_poll());
        let push = h.channel.script("doc-1");

        assert!(h.tracker.track("doc-1").await);
        settle().await;
        assert_eq!(
            h.tracker.status("doc-1").await.unwrap().connection,
            ConnectionState::Connected
        );

        push.send(Ok(StatusUpdate::new("processing"))).unwrap();
        settle().await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Processing));

        push.send(Ok(StatusUpdate::new("ready"))).unwrap();
        push.send(Ok(StatusUpdate::new("ready"))).unwrap();
        settle().await;

        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Ready));
        assert_eq!(h.events.became_ready("doc-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_twice_is_noop() {
        let h = harness(slow_poll());
        h.channel.script("doc-1");

        assert!(h.tracker.track("doc-1").await);
        assert!(!h.tracker.track("doc-1").await);
        settle().await;
        assert_eq!(h.channel.connects("doc-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fallback_reaches_ready_without_push() {
        let h = harness(TrackerConfig {
            reconnect_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(5),
        });
        // No scripted connection: every connect is refused
        h.tracker.track("doc-1").await;
        settle().await;

        h.poller.respond("doc-1", StatusUpdate::new("processing").with_message("Chunking"));
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        let status = h.tracker.status("doc-1").await.unwrap();
        assert_eq!(status.readiness, Readiness::Processing);
        assert_eq!(status.message, "Chunking");

        h.poller.respond("doc-1", StatusUpdate::new("complete"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Ready));

        // Polling stops once terminal
        let polls = h.poller.polls("doc-1");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.poller.polls("doc-1"), polls);
        assert_eq!(h.tracker.live_workers().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_push_after_poll_ready_is_ignored() {
        let h = harness(TrackerConfig {
            reconnect_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(5),
        });
        let push = h.channel.script("doc-1");
        h.poller.respond("doc-1", StatusUpdate::new("ready"));

        h.tracker.track("doc-1").await;
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Ready));

        // Worker has exited; a late frame cannot reach the record
        let _ = push.send(Ok(StatusUpdate::new("processing")));
        settle().await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Ready));
        assert_eq!(h.events.became_ready("doc-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_once_after_fixed_backoff() {
        let h = harness(slow_poll());
        let first = h.channel.script("doc-1");
        let _second = h.channel.script("doc-1");

        h.tracker.track("doc-1").await;
        settle().await;
        assert_eq!(h.channel.connects("doc-1"), 1);

        drop(first);
        settle().await;
        assert_eq!(
            h.tracker.status("doc-1").await.unwrap().connection,
            ConnectionState::Disconnected
        );
        assert_eq!(h.events.reconnects_scheduled("doc-1"), 1);

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(h.channel.connects("doc-1"), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.channel.connects("doc-1"), 2);
        assert_eq!(
            h.tracker.status("doc-1").await.unwrap().connection,
            ConnectionState::Connected
        );

        // Second connection stays open: nothing more is scheduled
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.channel.connects("doc-1"), 2);
        assert_eq!(h.events.reconnects_scheduled("doc-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reconnect_when_terminal_at_close() {
        let h = harness(slow_poll());
        let push = h.channel.script("doc-1");

        h.tracker.track("doc-1").await;
        settle().await;

        push.send(Ok(StatusUpdate::new("failed").with_message("Could not parse PDF")))
            .unwrap();
        drop(push);
        tokio::time::sleep(Duration::from_secs(30)).await;

        let status = h.tracker.status("doc-1").await.unwrap();
        assert_eq!(status.readiness, Readiness::Error);
        assert_eq!(status.message, "Could not parse PDF");
        assert_eq!(h.channel.connects("doc-1"), 1);
        assert_eq!(h.events.reconnects_scheduled("doc-1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_not_retried_automatically() {
        let h = harness(TrackerConfig {
            reconnect_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(5),
        });
        h.poller.respond("doc-1", StatusUpdate::new("error"));
        h.tracker.track("doc-1").await;
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Error));

        h.poller.respond("doc-1", StatusUpdate::new("ready"));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_restarts_sources() {
        let h = harness(slow_poll());
        let push = h.channel.script("doc-1");
        h.tracker.track("doc-1").await;
        settle().await;
        push.send(Ok(StatusUpdate::new("error"))).unwrap();
        settle().await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Error));

        let push = h.channel.script("doc-1");
        h.tracker.retry("doc-1").await.unwrap();
        settle().await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Processing));
        assert_eq!(h.channel.connects("doc-1"), 2);

        push.send(Ok(StatusUpdate::new("processed"))).unwrap();
        settle().await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Ready));

        // Ready is terminal: retry is refused
        assert!(matches!(
            h.tracker.retry("doc-1").await,
            Err(Error::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.tracker.retry("unknown").await,
            Err(Error::NotTracked(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_leaves_no_workers_or_channels() {
        let h = harness(TrackerConfig::default());
        let mut senders = Vec::new();
        for i in 0..4 {
            let doc_id = format!("doc-{i}");
            senders.push(h.channel.script(&doc_id));
            h.tracker.track(&doc_id).await;
        }
        // One document without a channel, waiting on its reconnect timer
        h.tracker.track("doc-offline").await;
        settle().await;

        assert_eq!(h.tracker.live_workers().await, 5);
        assert_eq!(h.channel.open_streams(), 4);

        h.tracker.shutdown().await;

        assert_eq!(h.tracker.live_workers().await, 0);
        assert_eq!(h.channel.open_streams(), 0);

        // Timers are gone too: no connects or polls after teardown
        let connects = h.channel.total_connects();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.channel.total_connects(), connects);
        assert_eq!(h.poller.total_polls(), 0);
        assert!(!h.tracker.track("doc-late").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_workers_are_pruned() {
        let h = harness(slow_poll());
        let mut senders = Vec::new();
        for i in 0..3 {
            let doc_id = format!("doc-{i}");
            senders.push(h.channel.script(&doc_id));
            h.tracker.track(&doc_id).await;
        }
        settle().await;
        assert_eq!(h.tracker.workers.lock().await.len(), 3);

        for push in &senders {
            push.send(Ok(StatusUpdate::new("ready"))).unwrap();
        }
        settle().await;

        assert_eq!(h.tracker.live_workers().await, 0);
        assert!(h.tracker.workers.lock().await.is_empty());
        // Terminal readiness outlives the worker
        assert_eq!(h.tracker.snapshot().await.len(), 3);
        assert_eq!(h.tracker.readiness("doc-2").await, Some(Readiness::Ready));

        h.channel.script("doc-3");
        h.tracker.track("doc-3").await;
        settle().await;
        assert_eq!(h.tracker.workers.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_frames_apply_while_poll_in_flight() {
        let h = harness(TrackerConfig {
            reconnect_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(5),
        });
        let push = h.channel.script("doc-1");
        h.tracker.track("doc-1").await;
        settle().await;

        h.poller.hold();
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(h.poller.polls("doc-1"), 1);

        push.send(Ok(StatusUpdate::new("processing").with_message("Embedding")))
            .unwrap();
        settle().await;
        assert_eq!(h.tracker.status("doc-1").await.unwrap().message, "Embedding");

        push.send(Ok(StatusUpdate::new("ready"))).unwrap();
        settle().await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Ready));
        assert_eq!(h.tracker.live_workers().await, 0);

        h.poller.release();
        settle().await;
        assert_eq!(h.tracker.readiness("doc-1").await, Some(Readiness::Ready));
        assert_eq!(h.events.became_ready("doc-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untrack_forgets_document() {
        let h = harness(slow_poll());
        h.channel.script("doc-1");
        h.tracker.track("doc-1").await;
        settle().await;

        h.tracker.untrack("doc-1").await;
        assert!(h.tracker.status("doc-1").await.is_none());
        assert_eq!(h.channel.open_streams(), 0);
        assert_eq!(h.tracker.live_workers().await, 0);
    }
}
