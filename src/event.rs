//! Revision events: the append-only audit trail.
//!
//! Every decision the executor applies leaves at least one event behind.
//! Events are never mutated or deleted after insertion.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fact::{EventId, FactId};

/// The outcome chosen for a candidate fact.
///
/// Also used as the heuristic recommendation in a conflict report and as the
/// wire action in oracle decisions, which is why the serde form is UPPERCASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RevisionAction {
    /// Insert the candidate as a new live fact.
    Add,
    /// The candidate replaces an existing fact.
    Supersede,
    /// The candidate and an existing fact are merged into a new fact.
    Merge,
    /// The candidate is a duplicate; nothing new is stored.
    Ignore,
}

impl fmt::Display for RevisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "ADD"),
            Self::Supersede => write!(f, "SUPERSEDE"),
            Self::Merge => write!(f, "MERGE"),
            Self::Ignore => write!(f, "IGNORE"),
        }
    }
}

/// One entry in the revision history of a fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionEvent {
    pub id: EventId,

    /// The fact this event is about.
    pub fact_id: FactId,

    pub action: RevisionAction,

    /// For SUPERSEDE and MERGE events: the fact that replaced `fact_id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<FactId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Confidence of the decision that produced this event, 0–100.
    pub confidence: u8,

    pub timestamp: DateTime<Utc>,
}

impl RevisionEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(fact_id: FactId, action: RevisionAction, confidence: u8) -> Self {
        Self {
            id: EventId::new(),
            fact_id,
            action,
            superseded_by: None,
            reason: None,
            confidence,
            timestamp: Utc::now(),
        }
    }

    /// Sets the replacing fact id.
    #[must_use]
    pub fn with_superseded_by(mut self, by: FactId) -> Self {
        self.superseded_by = Some(by);
        self
    }

    /// Sets the reason text.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
