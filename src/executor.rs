//! Decision execution.
//!
//! Applies a `Decision` to the store as one unit of work. Fact writes are
//! journaled and compensated in reverse on failure; history events are
//! appended last, as one batch, so a half-applied decision is never visible.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{RevisionError, RevisionResult};
use crate::event::{RevisionAction, RevisionEvent};
use crate::fact::{validate_confidence, CandidateFact, Fact, FactId, MemorySpaceId, SourceType};
use crate::resolver::Decision;
use crate::storage::{FactStore, HistoryStore, StorageError};

/// Attempts per sub-write before a transient storage error surfaces.
const TRANSIENT_WRITE_ATTEMPTS: usize = 3;

/// Hop bound shared with the chain walker; a supersession chain longer
/// than this is treated as runaway.
pub(crate) const MAX_CHAIN_HOPS: usize = 128;

/// The applied outcome of one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionOutcome {
    pub action: RevisionAction,

    /// The fact this decision produced (ADD: the candidate; SUPERSEDE: the
    /// replacement; MERGE: the merged fact). None for IGNORE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact: Option<Fact>,

    /// Facts invalidated by this decision.
    pub invalidated: Vec<FactId>,

    /// Audit events appended for this decision.
    pub events: Vec<RevisionEvent>,
}

/// Result of the manual supersede operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Superseded {
    pub superseded: bool,
}

/// One undoable sub-write, recorded before the next write proceeds.
enum AppliedWrite {
    Inserted { space: MemorySpaceId, id: FactId },
    Replaced { before: Box<Fact> },
}

impl AppliedWrite {
    fn describe(&self) -> String {
        match self {
            Self::Inserted { id, .. } => format!("insert fact {id}"),
            Self::Replaced { before } => format!("update fact {}", before.id),
        }
    }
}

fn with_retry<T>(mut op: impl FnMut() -> Result<T, StorageError>) -> Result<T, StorageError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < TRANSIENT_WRITE_ATTEMPTS => {
                warn!(error = %e, attempt, "transient storage error, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Applies decisions and manual supersessions to the store.
pub struct RevisionExecutor {
    facts: Arc<dyn FactStore>,
    history: Arc<dyn HistoryStore>,
}

impl RevisionExecutor {
    /// Create an executor over the given stores.
    #[must_use]
    pub fn new(facts: Arc<dyn FactStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self { facts, history }
    }

    /// Apply a decision for a candidate fact.
    ///
    /// All writes of one call form a unit: on a failed sub-write the
    /// already-applied writes are undone in reverse order. A failed undo
    /// surfaces `CompensationFailed` with a correlation id and the write
    /// journal for manual reconciliation.
    pub fn apply(
        &self,
        candidate: CandidateFact,
        decision: &Decision,
    ) -> RevisionResult<RevisionOutcome> {
        // Decisions from the parser are already validated; decisions built
        // by callers are not, so re-check before touching the store.
        validate_confidence(i64::from(decision.confidence))?;

        let correlation_id = Uuid::new_v4();
        let mut journal: Vec<AppliedWrite> = Vec::new();

        let result = self.apply_inner(candidate, decision, &mut journal);
        match result {
            Ok(outcome) => {
                debug!(
                    correlation = %correlation_id,
                    action = %outcome.action,
                    invalidated = outcome.invalidated.len(),
                    "decision applied"
                );
                Ok(outcome)
            }
            Err(source) => {
                warn!(correlation = %correlation_id, error = %source, "apply failed, compensating");
                self.compensate(journal, correlation_id)?;
                Err(source)
            }
        }
    }

    fn apply_inner(
        &self,
        candidate: CandidateFact,
        decision: &Decision,
        journal: &mut Vec<AppliedWrite>,
    ) -> RevisionResult<RevisionOutcome> {
        match decision.action {
            RevisionAction::Add => self.apply_add(candidate, decision, journal),
            RevisionAction::Supersede => self.apply_supersede(candidate, decision, journal),
            RevisionAction::Merge => self.apply_merge(candidate, decision, journal),
            RevisionAction::Ignore => self.apply_ignore(&candidate, decision),
        }
    }

    fn insert_journaled(&self, fact: Fact, journal: &mut Vec<AppliedWrite>) -> RevisionResult<()> {
        let space = fact.memory_space_id.clone();
        let id = fact.id;
        with_retry(|| self.facts.insert(fact.clone()))?;
        journal.push(AppliedWrite::Inserted { space, id });
        Ok(())
    }

    fn update_journaled(
        &self,
        before: Fact,
        after: Fact,
        journal: &mut Vec<AppliedWrite>,
    ) -> RevisionResult<()> {
        with_retry(|| self.facts.update(after.clone()))?;
        journal.push(AppliedWrite::Replaced {
            before: Box::new(before),
        });
        Ok(())
    }

    fn apply_add(
        &self,
        candidate: CandidateFact,
        decision: &Decision,
        journal: &mut Vec<AppliedWrite>,
    ) -> RevisionResult<RevisionOutcome> {
        let fact = candidate.into_fact(Utc::now());
        self.insert_journaled(fact.clone(), journal)?;

        let mut event = RevisionEvent::new(fact.id, RevisionAction::Add, decision.confidence);
        if let Some(reason) = &decision.reason {
            event = event.with_reason(reason.clone());
        }
        with_retry(|| self.history.append_all(vec![event.clone()]))?;

        Ok(RevisionOutcome {
            action: RevisionAction::Add,
            fact: Some(fact),
            invalidated: Vec::new(),
            events: vec![event],
        })
    }

    fn apply_supersede(
        &self,
        candidate: CandidateFact,
        decision: &Decision,
        journal: &mut Vec<AppliedWrite>,
    ) -> RevisionResult<RevisionOutcome> {
        let target_id = required_target(decision)?;
        let space = candidate.memory_space_id.clone();
        let target = self.live_target(&space, target_id)?;

        let now = Utc::now();
        let mut fact = candidate.into_fact(now);
        fact.supersedes = Some(target_id);
        self.insert_journaled(fact.clone(), journal)?;

        let mut invalidated_target = target.clone();
        invalidated_target.mark_superseded(fact.id, now);
        self.update_journaled(target, invalidated_target, journal)?;

        let mut event = RevisionEvent::new(target_id, RevisionAction::Supersede, decision.confidence)
            .with_superseded_by(fact.id);
        if let Some(reason) = &decision.reason {
            event = event.with_reason(reason.clone());
        }
        with_retry(|| self.history.append_all(vec![event.clone()]))?;

        Ok(RevisionOutcome {
            action: RevisionAction::Supersede,
            fact: Some(fact),
            invalidated: vec![target_id],
            events: vec![event],
        })
    }

    fn apply_merge(
        &self,
        candidate: CandidateFact,
        decision: &Decision,
        journal: &mut Vec<AppliedWrite>,
    ) -> RevisionResult<RevisionOutcome> {
        let target_id = required_target(decision)?;
        let merge = decision
            .merged_fact
            .clone()
            .ok_or_else(|| RevisionError::Resolver(crate::error::ResolverError::MalformedDecision {
                reason: "MERGE decision is missing merged_fact".to_string(),
            }))?;

        let space = candidate.memory_space_id.clone();
        let target = self.live_target(&space, target_id)?;

        let now = Utc::now();

        // The candidate is stored first so both merge inputs exist in the
        // audit trail, then immediately invalidated by the merged fact.
        let candidate_fact = candidate.clone().into_fact(now);
        self.insert_journaled(candidate_fact.clone(), journal)?;

        let merged_confidence = match merge.confidence {
            Some(c) => c,
            None => candidate.confidence.max(target.confidence),
        };
        let mut merged_tags = merge.tags.unwrap_or_else(|| {
            let mut tags = candidate.tags.clone();
            tags.extend(target.tags.iter().cloned());
            tags
        });
        merged_tags.retain(|t| !t.trim().is_empty());

        let merged = Fact {
            id: FactId::new(),
            memory_space_id: space.clone(),
            fact: merge.fact.unwrap_or_else(|| candidate.fact.clone()),
            fact_type: merge.fact_type.unwrap_or(candidate.fact_type),
            subject: merge.subject.unwrap_or_else(|| candidate.subject.clone()),
            predicate: merge.predicate.or_else(|| candidate.predicate.clone()),
            object: merge.object.or_else(|| candidate.object.clone()),
            confidence: merged_confidence,
            source_type: SourceType::Inference,
            tags: merged_tags,
            valid_from: now,
            valid_until: None,
            // One back-pointer per fact: the merged fact names the existing
            // target as its predecessor; the stored candidate stays
            // reachable through its MERGE event.
            supersedes: Some(target_id),
            superseded_by: None,
        };
        self.insert_journaled(merged.clone(), journal)?;

        let mut invalidated_target = target.clone();
        invalidated_target.mark_superseded(merged.id, now);
        self.update_journaled(target, invalidated_target, journal)?;

        let mut invalidated_candidate = candidate_fact.clone();
        invalidated_candidate.mark_superseded(merged.id, now);
        self.update_journaled(candidate_fact.clone(), invalidated_candidate, journal)?;

        let mut events = vec![
            RevisionEvent::new(target_id, RevisionAction::Merge, decision.confidence)
                .with_superseded_by(merged.id),
            RevisionEvent::new(candidate_fact.id, RevisionAction::Merge, decision.confidence)
                .with_superseded_by(merged.id),
        ];
        if let Some(reason) = &decision.reason {
            for event in &mut events {
                event.reason = Some(reason.clone());
            }
        }
        with_retry(|| self.history.append_all(events.clone()))?;

        Ok(RevisionOutcome {
            action: RevisionAction::Merge,
            fact: Some(merged),
            invalidated: vec![target_id, candidate_fact.id],
            events,
        })
    }

    fn apply_ignore(
        &self,
        candidate: &CandidateFact,
        decision: &Decision,
    ) -> RevisionResult<RevisionOutcome> {
        let target_id = required_target(decision)?;
        let space = &candidate.memory_space_id;
        if self.facts.get(space, target_id)?.is_none() {
            return Err(RevisionError::NotFound { id: target_id });
        }

        let mut event = RevisionEvent::new(target_id, RevisionAction::Ignore, decision.confidence);
        if let Some(reason) = &decision.reason {
            event = event.with_reason(reason.clone());
        }
        with_retry(|| self.history.append_all(vec![event.clone()]))?;

        Ok(RevisionOutcome {
            action: RevisionAction::Ignore,
            fact: None,
            invalidated: Vec::new(),
            events: vec![event],
        })
    }

    /// Manual supersession: replace `old_id` with the already-stored
    /// `new_id` without running the detection pipeline.
    pub fn supersede(
        &self,
        space: &MemorySpaceId,
        old_id: FactId,
        new_id: FactId,
        reason: Option<String>,
    ) -> RevisionResult<Superseded> {
        if old_id == new_id {
            return Err(RevisionError::SelfSupersession { id: old_id });
        }

        let old = self
            .facts
            .get(space, old_id)?
            .ok_or(RevisionError::NotFound { id: old_id })?;
        let new = self
            .facts
            .get(space, new_id)?
            .ok_or(RevisionError::NotFound { id: new_id })?;

        if let Some(by) = old.superseded_by {
            return Err(RevisionError::AlreadySuperseded { id: old_id, by });
        }
        if let Some(existing) = new.supersedes {
            return Err(RevisionError::PredecessorConflict {
                id: new_id,
                existing,
            });
        }

        // Walk the chain behind the old fact before linking: if the
        // replacement already appears among its ancestors, linking would
        // close a loop.
        self.ensure_no_cycle(space, &old, new_id)?;

        let now = Utc::now();
        let mut journal: Vec<AppliedWrite> = Vec::new();
        let correlation_id = Uuid::new_v4();

        let result = (|| -> RevisionResult<()> {
            let mut linked_new = new.clone();
            linked_new.supersedes = Some(old_id);
            self.update_journaled(new, linked_new, &mut journal)?;

            let mut invalidated_old = old.clone();
            invalidated_old.mark_superseded(new_id, now);
            self.update_journaled(old.clone(), invalidated_old, &mut journal)?;

            let mut event = RevisionEvent::new(old_id, RevisionAction::Supersede, 100)
                .with_superseded_by(new_id);
            if let Some(reason) = reason {
                event = event.with_reason(reason);
            }
            with_retry(|| self.history.append_all(vec![event.clone()]))?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(Superseded { superseded: true }),
            Err(source) => {
                warn!(correlation = %correlation_id, error = %source, "supersede failed, compensating");
                self.compensate(journal, correlation_id)?;
                Err(source)
            }
        }
    }

    fn live_target(&self, space: &MemorySpaceId, target_id: FactId) -> RevisionResult<Fact> {
        let target = self
            .facts
            .get(space, target_id)?
            .ok_or(RevisionError::NotFound { id: target_id })?;
        if let Some(by) = target.superseded_by {
            return Err(RevisionError::AlreadySuperseded { id: target_id, by });
        }
        Ok(target)
    }

    fn ensure_no_cycle(
        &self,
        space: &MemorySpaceId,
        old: &Fact,
        new_id: FactId,
    ) -> RevisionResult<()> {
        let mut visited = std::collections::HashSet::from([old.id]);
        let mut cursor = old.supersedes;
        let mut hops = 0usize;

        while let Some(ancestor_id) = cursor {
            if ancestor_id == new_id || !visited.insert(ancestor_id) {
                return Err(RevisionError::CycleDetected { id: ancestor_id });
            }
            hops += 1;
            if hops > MAX_CHAIN_HOPS {
                return Err(RevisionError::CycleDetected { id: ancestor_id });
            }
            cursor = self
                .facts
                .get(space, ancestor_id)?
                .and_then(|f| f.supersedes);
        }
        Ok(())
    }

    fn compensate(&self, journal: Vec<AppliedWrite>, correlation_id: Uuid) -> RevisionResult<()> {
        let attempted: Vec<String> = journal.iter().map(AppliedWrite::describe).collect();

        for write in journal.into_iter().rev() {
            let undo = match &write {
                AppliedWrite::Inserted { space, id } => {
                    with_retry(|| self.facts.remove(space, *id))
                }
                AppliedWrite::Replaced { before } => {
                    with_retry(|| self.facts.update(before.as_ref().clone()))
                }
            };
            if let Err(source) = undo {
                error!(
                    correlation = %correlation_id,
                    error = %source,
                    "compensation failed; store needs manual reconciliation"
                );
                return Err(RevisionError::CompensationFailed {
                    correlation_id,
                    attempted,
                    source,
                });
            }
        }
        Ok(())
    }
}

fn required_target(decision: &Decision) -> RevisionResult<FactId> {
    decision.target_fact_id.ok_or_else(|| {
        RevisionError::Resolver(crate::error::ResolverError::MalformedDecision {
            reason: format!("{} decision is missing target_fact_id", decision.action),
        })
    })
}
