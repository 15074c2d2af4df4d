//! Conflict detection.
//!
//! Unifies slot and semantic matches into one report and attaches a
//! heuristic recommendation. The heuristic is authoritative when no oracle
//! is configured and advisory (a hint) when one is.

use std::sync::Arc;

use tracing::debug;

use crate::config::RevisionConfig;
use crate::conflict::{ConflictCandidate, ConflictReport};
use crate::event::RevisionAction;
use crate::fact::{CandidateFact, Fact};
use crate::matcher::{SemanticMatcher, SlotMatcher};
use crate::similarity::SimilarityScorer;

/// Runs both matchers over a corpus of live facts and folds the results
/// into a `ConflictReport`.
pub struct ConflictDetector {
    slot_matching: bool,
    semantic: Option<SemanticMatcher>,
}

impl ConflictDetector {
    /// Build a detector from configuration and an optional scorer.
    ///
    /// Semantic matching activates only when both a scorer is present and
    /// the config enables it.
    #[must_use]
    pub fn new(config: &RevisionConfig, scorer: Option<Arc<dyn SimilarityScorer>>) -> Self {
        let semantic = match scorer {
            Some(scorer) if config.semantic_matching.enabled => Some(SemanticMatcher::new(
                scorer,
                config.semantic_matching.threshold,
            )),
            _ => None,
        };
        Self {
            slot_matching: config.slot_matching,
            semantic,
        }
    }

    /// Check a candidate against the corpus.
    #[must_use]
    pub fn check(&self, candidate: &CandidateFact, corpus: &[Fact]) -> ConflictReport {
        let slot_conflicts = if self.slot_matching {
            SlotMatcher::matches(candidate, corpus)
        } else {
            Vec::new()
        };

        let mut semantic_conflicts = match &self.semantic {
            Some(matcher) => matcher.matches(candidate, corpus),
            None => Vec::new(),
        };
        // A fact already surfaced as a slot conflict stays in the slot list only.
        semantic_conflicts.retain(|s| !slot_conflicts.iter().any(|c| c.fact_id == s.fact_id));

        let has_conflicts = !slot_conflicts.is_empty() || !semantic_conflicts.is_empty();
        let recommended_action =
            recommend(candidate, &slot_conflicts, &semantic_conflicts, corpus);

        debug!(
            subject = %candidate.subject,
            slot = slot_conflicts.len(),
            semantic = semantic_conflicts.len(),
            recommendation = %recommended_action,
            "conflict check complete"
        );

        ConflictReport {
            has_conflicts,
            slot_conflicts,
            semantic_conflicts,
            recommended_action,
        }
    }
}

/// The heuristic recommendation:
/// - no conflicts → ADD
/// - slot conflict with an identical object → IGNORE (true duplicate)
/// - slot conflict with a different object → SUPERSEDE
/// - semantic-only conflict → MERGE (conservative)
fn recommend(
    candidate: &CandidateFact,
    slot_conflicts: &[ConflictCandidate],
    semantic_conflicts: &[ConflictCandidate],
    corpus: &[Fact],
) -> RevisionAction {
    if !slot_conflicts.is_empty() {
        let duplicate = slot_conflicts.iter().any(|c| {
            corpus
                .iter()
                .find(|f| f.id == c.fact_id)
                .is_some_and(|f| same_object(candidate.object.as_deref(), f.object.as_deref()))
        });
        return if duplicate {
            RevisionAction::Ignore
        } else {
            RevisionAction::Supersede
        };
    }

    if !semantic_conflicts.is_empty() {
        return RevisionAction::Merge;
    }

    RevisionAction::Add
}

fn same_object(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}
