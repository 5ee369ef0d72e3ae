//! Per-document status worker.
//!
//! One task per tracked document and the only writer of that document's
//! record. Push frames, poll results and reconnect timers are handled in one
//! `select!` loop, so updates apply in receipt order.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Readiness;

use super::channel::{StatusChannel, StatusPoller, StatusStream};
use super::reducer::{self, Effect};
use super::types::{
    ConnectionState, DocumentStatus, Source, StatusEmitter, StatusEvent, StatusUpdate,
    TrackerConfig,
};

pub(crate) type Records = Arc<RwLock<HashMap<String, DocumentStatus>>>;

pub(crate) struct Worker {
    pub doc_id: String,
    pub channel: Arc<dyn StatusChannel>,
    pub poller: Arc<dyn StatusPoller>,
    pub emitter: Arc<dyn StatusEmitter>,
    pub records: Records,
    pub config: TrackerConfig,
    pub cancel: CancellationToken,
}

/// What the loop should do after an update.
enum Next {
    Continue,
    /// The document reached this terminal state.
    Terminal(Readiness),
    /// The record was removed.
    Gone,
}

type PollFetch<'a> = BoxFuture<'a, Result<StatusUpdate>>;

impl Worker {
    pub(crate) async fn run(self) {
        let doc_id = self.doc_id.clone();
        tracing::debug!(doc_id = %doc_id, "Status worker started");

        let mut push: Option<StatusStream> = None;
        let mut attempt: u32 = 0;
        let mut ended_on: Option<Readiness> = None;

        let reconnect = tokio::time::sleep(self.config.reconnect_delay);
        tokio::pin!(reconnect);
        let mut reconnect_armed = false;

        let mut poll = tokio::time::interval_at(
            Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // In-flight poll request, raced against push frames
        let mut poll_fetch: Option<PollFetch<'_>> = None;

        // Initial connect
        match self.connect().await {
            Some(Ok(stream)) => push = Some(stream),
            Some(Err(_)) => {
                attempt += 1;
                reconnect
                    .as_mut()
                    .reset(Instant::now() + self.config.reconnect_delay);
                reconnect_armed = self.schedule_reconnect(attempt).await;
            }
            None => return self.finish(push, ended_on).await,
        }

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    tracing::debug!(doc_id = %doc_id, "Status worker cancelled");
                    break;
                }

                frame = next_frame(&mut push), if push.is_some() => {
                    let closed = match frame {
                        Some(Ok(update)) => match self.apply(Source::Push, &update).await {
                            Next::Continue => false,
                            Next::Terminal(readiness) => {
                                ended_on = Some(readiness);
                                break;
                            }
                            Next::Gone => break,
                        },
                        Some(Err(e)) => {
                            tracing::warn!(doc_id = %doc_id, error = %e, "Status channel error");
                            true
                        }
                        None => {
                            tracing::debug!(doc_id = %doc_id, "Status channel closed");
                            true
                        }
                    };

                    if closed {
                        push = None;
                        self.set_connection(ConnectionState::Disconnected).await;
                        attempt += 1;
                        reconnect
                            .as_mut()
                            .reset(Instant::now() + self.config.reconnect_delay);
                        reconnect_armed = self.schedule_reconnect(attempt).await;
                    }
                }

                _ = &mut reconnect, if reconnect_armed => {
                    reconnect_armed = false;
                    match self.connect().await {
                        Some(Ok(stream)) => {
                            attempt = 0;
                            push = Some(stream);
                        }
                        Some(Err(_)) => {
                            attempt += 1;
                            reconnect
                                .as_mut()
                                .reset(Instant::now() + self.config.reconnect_delay);
                            reconnect_armed = self.schedule_reconnect(attempt).await;
                        }
                        None => break,
                    }
                }

                result = next_poll(&mut poll_fetch), if poll_fetch.is_some() => {
                    poll_fetch = None;
                    match result {
                        Ok(update) => match self.apply(Source::Poll, &update).await {
                            Next::Continue => {}
                            Next::Terminal(readiness) => {
                                ended_on = Some(readiness);
                                break;
                            }
                            Next::Gone => break,
                        },
                        Err(e) if e.is_transient() => {
                            tracing::debug!(doc_id = %doc_id, error = %e, "Status poll failed, retrying on next tick");
                        }
                        Err(e) => {
                            tracing::warn!(doc_id = %doc_id, error = %e, "Status poll rejected");
                        }
                    }
                }

                _ = poll.tick(), if poll_fetch.is_none() => {
                    poll_fetch = Some(self.poller.fetch_status(&self.doc_id));
                }
            }
        }

        drop(poll_fetch);
        self.finish(push, ended_on).await;
    }

    /// Connect the push channel. `None` when cancelled mid-connect.
    async fn connect(&self) -> Option<Result<StatusStream>> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            result = self.channel.connect(&self.doc_id) => result,
        };

        match result {
            Ok(stream) => {
                self.set_connection(ConnectionState::Connected).await;
                Some(Ok(stream))
            }
            Err(e) => {
                tracing::warn!(doc_id = %self.doc_id, error = %e, "Status channel connect failed");
                Some(Err(e))
            }
        }
    }

    /// Announce a reconnect if the document still needs one.
    ///
    /// Returns whether the reconnect timer should be armed.
    async fn schedule_reconnect(&self, attempt: u32) -> bool {
        let readiness = self
            .records
            .read()
            .await
            .get(&self.doc_id)
            .map(|r| r.readiness);

        if readiness != Some(Readiness::Processing) {
            return false;
        }

        let delay_ms = self.config.reconnect_delay.as_millis() as u64;
        tracing::info!(doc_id = %self.doc_id, delay_ms, attempt, "Reconnect scheduled");
        self.emitter.emit(StatusEvent::ReconnectScheduled {
            doc_id: self.doc_id.clone(),
            delay_ms,
            attempt,
        });
        true
    }

    /// Run one update through the reducer and publish its effect.
    async fn apply(&self, source: Source, update: &StatusUpdate) -> Next {
        let transition = {
            let mut records = self.records.write().await;
            let Some(current) = records.get(&self.doc_id) else {
                tracing::debug!(doc_id = %self.doc_id, "Record removed, stopping worker");
                return Next::Gone;
            };
            let transition = reducer::reduce(current, source, update);
            if transition.is_change() {
                records.insert(self.doc_id.clone(), transition.next.clone());
            }
            transition
        };

        let doc_id = self.doc_id.clone();
        match transition.effect {
            Effect::None => {}
            Effect::MessageChanged => {
                tracing::debug!(doc_id = %doc_id, %source, message = %transition.next.message, "Progress");
                self.emitter.emit(StatusEvent::MessageChanged {
                    doc_id,
                    message: transition.next.message.clone(),
                });
            }
            Effect::BecameReady => {
                tracing::info!(doc_id = %doc_id, %source, "Document ready");
                self.emitter.emit(StatusEvent::ReadinessChanged {
                    doc_id: doc_id.clone(),
                    readiness: Readiness::Ready,
                    message: transition.next.message.clone(),
                });
                self.emitter.emit(StatusEvent::BecameReady { doc_id });
            }
            Effect::BecameFailed => {
                tracing::warn!(doc_id = %doc_id, %source, message = %transition.next.message, "Document processing failed");
                self.emitter.emit(StatusEvent::ReadinessChanged {
                    doc_id,
                    readiness: Readiness::Error,
                    message: transition.next.message.clone(),
                });
            }
        }

        if transition.next.readiness.is_terminal() {
            Next::Terminal(transition.next.readiness)
        } else {
            Next::Continue
        }
    }

    async fn set_connection(&self, state: ConnectionState) {
        let changed = {
            let mut records = self.records.write().await;
            match records.get_mut(&self.doc_id) {
                Some(record) if record.connection != state => {
                    *record = reducer::with_connection(record, state);
                    true
                }
                _ => false,
            }
        };

        if changed {
            self.emitter.emit(StatusEvent::Connection {
                doc_id: self.doc_id.clone(),
                state,
            });
        }
    }

    /// Close the push channel and mark the record disconnected.
    ///
    /// A worker that stopped on a terminal state only touches the record while
    /// it still holds that state. After a retry the record belongs to the next
    /// worker.
    async fn finish(&self, push: Option<StatusStream>, ended_on: Option<Readiness>) {
        drop(push);
        let changed = {
            let mut records = self.records.write().await;
            match records.get_mut(&self.doc_id) {
                Some(record)
                    if record.is_connected()
                        && ended_on.map_or(true, |r| r == record.readiness) =>
                {
                    *record = reducer::with_connection(record, ConnectionState::Disconnected);
                    true
                }
                _ => false,
            }
        };

        if changed {
            self.emitter.emit(StatusEvent::Connection {
                doc_id: self.doc_id.clone(),
                state: ConnectionState::Disconnected,
            });
        }
        tracing::debug!(doc_id = %self.doc_id, "Status worker stopped");
    }
}

async fn next_frame(push: &mut Option<StatusStream>) -> Option<Result<StatusUpdate>> {
    match push.as_mut() {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn next_poll(fetch: &mut Option<PollFetch<'_>>) -> Result<StatusUpdate> {
    match fetch.as_mut() {
        Some(fetch) => fetch.await,
        None => std::future::pending().await,
    }
}
