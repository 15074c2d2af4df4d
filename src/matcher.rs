//! Conflict matchers.
//!
//! Two independent strategies surface existing facts that collide with a
//! candidate: slot matching (same subject+predicate belief position) and
//! semantic matching (statement similarity above a threshold). Both are
//! pure functions over a caller-supplied corpus of live facts.

use std::sync::Arc;

use crate::conflict::ConflictCandidate;
use crate::fact::{CandidateFact, Fact};
use crate::similarity::SimilarityScorer;

/// Finds live facts occupying the same belief slot as a candidate.
///
/// A slot is a `(subject, predicate)` pair representing a single-valued
/// belief position. Subjects compare case-sensitively; predicates compare
/// trimmed and case-insensitively. A fact or candidate without a predicate
/// occupies no slot and never slot-matches.
#[derive(Debug, Default)]
pub struct SlotMatcher;

impl SlotMatcher {
    /// Every fact in `corpus` sharing the candidate's slot, regardless of
    /// object value: a differing object for the same slot is exactly the
    /// conflict this matcher exists to surface.
    #[must_use]
    pub fn matches(candidate: &CandidateFact, corpus: &[Fact]) -> Vec<ConflictCandidate> {
        let Some(candidate_predicate) = candidate.slot_predicate() else {
            return Vec::new();
        };

        corpus
            .iter()
            .filter(|fact| fact.is_live())
            .filter(|fact| fact.memory_space_id == candidate.memory_space_id)
            .filter(|fact| fact.subject == candidate.subject)
            .filter(|fact| fact.slot_predicate().as_deref() == Some(candidate_predicate.as_str()))
            .map(|fact| ConflictCandidate::slot(fact.id))
            .collect()
    }
}

/// Finds live facts semantically equivalent to a candidate's statement.
///
/// Only active when a similarity scorer has been injected; independent of
/// slot fields, so it can catch paraphrased duplicates lacking identical
/// subject/predicate.
pub struct SemanticMatcher {
    scorer: Arc<dyn SimilarityScorer>,
    threshold: f32,
}

impl SemanticMatcher {
    /// Create a matcher over `scorer` reporting matches above `threshold`.
    #[must_use]
    pub fn new(scorer: Arc<dyn SimilarityScorer>, threshold: f32) -> Self {
        Self { scorer, threshold }
    }

    /// Every live fact in `corpus` whose statement scores above the
    /// threshold against the candidate's statement.
    #[must_use]
    pub fn matches(&self, candidate: &CandidateFact, corpus: &[Fact]) -> Vec<ConflictCandidate> {
        corpus
            .iter()
            .filter(|fact| fact.is_live())
            .filter(|fact| fact.memory_space_id == candidate.memory_space_id)
            .filter_map(|fact| {
                let score = self.scorer.score(&candidate.fact, &fact.fact);
                (score > self.threshold).then(|| ConflictCandidate::semantic(fact.id, score))
            })
            .collect()
    }
}
