//! Which user actions are currently permitted.
//!
//! Pure functions over current readiness. Callers re-evaluate on every
//! readiness change; nothing here is cached.

use serde::Serialize;

use crate::models::{Artifact, Document, DocumentSet, Readiness};

pub fn can_ask(doc: &Document) -> bool {
    doc.readiness == Readiness::Ready
}

pub fn can_summarize(doc: &Document) -> bool {
    doc.readiness == Readiness::Ready
}

pub fn can_analyze(doc: &Document) -> bool {
    doc.readiness == Readiness::Ready
}

/// At least two members and every one of them ready.
pub fn can_compare(set: &DocumentSet) -> bool {
    set.is_compare_ready()
}

/// Export works on an already-produced artifact, not on live readiness.
pub fn can_export(artifact: Option<&Artifact>) -> bool {
    artifact.is_some()
}

/// Per-document actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Ask,
    Summarize,
    Analyze,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Ask, Action::Summarize, Action::Analyze];

    pub fn is_permitted(&self, doc: &Document) -> bool {
        match self {
            Action::Ask => can_ask(doc),
            Action::Summarize => can_summarize(doc),
            Action::Analyze => can_analyze(doc),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Ask => write!(f, "Ask"),
            Action::Summarize => write!(f, "Summarize"),
            Action::Analyze => write!(f, "Analyze"),
        }
    }
}

pub fn permitted_actions(doc: &Document) -> Vec<Action> {
    Action::ALL
        .into_iter()
        .filter(|action| action.is_permitted(doc))
        .collect()
}

/// Why an action on `doc` is closed, for user-facing messages.
pub fn closed_reason(doc: &Document) -> String {
    match doc.readiness {
        Readiness::Uploading => format!("{} is still uploading", doc.display_name),
        Readiness::Processing => format!("{} is still processing", doc.display_name),
        Readiness::Error => format!("{} failed to process", doc.display_name),
        Readiness::Ready => String::new(),
    }
}
