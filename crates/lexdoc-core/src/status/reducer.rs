//! Pure readiness reducer shared by the push and poll sources.
//!
//! `(current, source, payload) -> next`. No I/O and no clocks, so every
//! arbitration rule is testable on its own.

use crate::models::Readiness;

use super::types::{ConnectionState, DocumentStatus, Source, StatusKind, StatusUpdate};

/// Observable effect of applying one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Update ignored or identical to current state
    None,
    /// Still processing, new progress text
    MessageChanged,
    /// `processing -> ready`
    BecameReady,
    /// `processing -> error`
    BecameFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: DocumentStatus,
    pub effect: Effect,
}

impl Transition {
    fn unchanged(current: &DocumentStatus) -> Self {
        Self {
            next: current.clone(),
            effect: Effect::None,
        }
    }

    pub fn is_change(&self) -> bool {
        self.effect != Effect::None
    }
}

/// Apply one status update.
///
/// - Only `processing` documents move; `ready` and `error` are left only by
///   [`retry`].
/// - Terminal updates apply from either source.
/// - While the push channel is connected it owns the progress text, so a
///   non-terminal poll update is ignored.
pub fn reduce(current: &DocumentStatus, source: Source, update: &StatusUpdate) -> Transition {
    if current.readiness != Readiness::Processing {
        return Transition::unchanged(current);
    }

    let message = update.message.clone().unwrap_or_default();

    match update.kind() {
        StatusKind::Ready => Transition {
            next: DocumentStatus {
                readiness: Readiness::Ready,
                message,
                ..current.clone()
            },
            effect: Effect::BecameReady,
        },
        StatusKind::Failed => Transition {
            next: DocumentStatus {
                readiness: Readiness::Error,
                message,
                ..current.clone()
            },
            effect: Effect::BecameFailed,
        },
        StatusKind::Progress => {
            if source == Source::Poll && current.is_connected() {
                return Transition::unchanged(current);
            }
            if message == current.message {
                return Transition::unchanged(current);
            }
            Transition {
                next: DocumentStatus {
                    message,
                    ..current.clone()
                },
                effect: Effect::MessageChanged,
            }
        }
    }
}

/// `error -> processing` on an explicit retry. `None` from any other state.
pub fn retry(current: &DocumentStatus) -> Option<DocumentStatus> {
    if current.readiness != Readiness::Error {
        return None;
    }
    Some(DocumentStatus {
        readiness: Readiness::Processing,
        message: String::new(),
        connection: ConnectionState::Disconnected,
        ..current.clone()
    })
}

/// Record a push channel connect or drop.
pub fn with_connection(current: &DocumentStatus, state: ConnectionState) -> DocumentStatus {
    DocumentStatus {
        connection: state,
        ..current.clone()
    }
}
