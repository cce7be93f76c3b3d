//! Trigger model - the event that starts a pipeline run

use serde::{Deserialize, Serialize};

/// An event that initiates a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Event kind (e.g. "push", "pull_request", "manual")
    pub event: String,

    /// Source reference the event points at (e.g. "refs/heads/main")
    pub source_ref: String,
}

impl Trigger {
    pub fn new(event: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            source_ref: source_ref.into(),
        }
    }

    /// Shorthand for a push to the given reference
    pub fn push(source_ref: impl Into<String>) -> Self {
        Self::new("push", source_ref)
    }

    /// Whether a pipeline listening on `events` should start for this trigger
    pub fn matches(&self, events: &[String]) -> bool {
        events.iter().any(|e| e == &self.event)
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.event, self.source_ref)
    }
}
