//! Conflict types for tracking contested belief slots.
//!
//! Conflicts are explicit objects, not hidden errors. When a candidate fact
//! collides with existing knowledge, the detector produces a report that
//! names every colliding fact and a heuristic recommendation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::RevisionAction;
use crate::fact::FactId;

/// Which detection strategy surfaced a conflict candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Same (subject, predicate) slot.
    Slot,
    /// Semantically equivalent statement per the similarity scorer.
    Semantic,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot => write!(f, "slot"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// One existing fact that collides with a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictCandidate {
    /// Id of the existing fact.
    pub fact_id: FactId,

    pub match_type: MatchType,

    /// Similarity score for semantic matches, on a 0–1 scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl ConflictCandidate {
    /// A slot match.
    #[must_use]
    pub fn slot(fact_id: FactId) -> Self {
        Self {
            fact_id,
            match_type: MatchType::Slot,
            score: None,
        }
    }

    /// A semantic match with its score.
    #[must_use]
    pub fn semantic(fact_id: FactId, score: f32) -> Self {
        Self {
            fact_id,
            match_type: MatchType::Semantic,
            score: Some(score),
        }
    }
}

/// The detector's verdict on a candidate fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictReport {
    pub has_conflicts: bool,
    pub slot_conflicts: Vec<ConflictCandidate>,
    pub semantic_conflicts: Vec<ConflictCandidate>,

    /// Heuristic recommendation: used directly when no oracle is
    /// configured, and passed to the oracle as a hint otherwise.
    pub recommended_action: RevisionAction,
}

impl ConflictReport {
    /// A report with no conflicts and an ADD recommendation.
    #[must_use]
    pub fn clean() -> Self {
        Self {
            has_conflicts: false,
            slot_conflicts: Vec::new(),
            semantic_conflicts: Vec::new(),
            recommended_action: RevisionAction::Add,
        }
    }

    /// Every colliding fact id, slot matches first.
    #[must_use]
    pub fn conflicting_ids(&self) -> Vec<FactId> {
        self.slot_conflicts
            .iter()
            .chain(self.semantic_conflicts.iter())
            .map(|c| c.fact_id)
            .collect()
    }

    /// Total number of conflict candidates.
    #[must_use]
    pub fn conflict_count(&self) -> usize {
        self.slot_conflicts.len() + self.semantic_conflicts.len()
    }
}
