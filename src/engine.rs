//! The revision engine: the public API facade.
//!
//! One engine instance owns its stores, its optional similarity scorer,
//! and its belief-revision configuration. Nothing here is process-global:
//! independently configured engines coexist freely (per tenant, per test).
//!
//! Revision operations touching the same belief slot are serialized
//! through an in-memory lock table keyed by `(memory space, subject,
//! predicate)`; disjoint slots and spaces proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use regex::RegexBuilder;
use tracing::{debug, info};

use crate::chain::ChainWalker;
use crate::config::RevisionConfig;
use crate::conflict::ConflictReport;
use crate::detector::ConflictDetector;
use crate::error::{RevisionError, RevisionResult, ValidationError};
use crate::event::RevisionEvent;
use crate::executor::{RevisionExecutor, RevisionOutcome, Superseded};
use crate::fact::{
    validate_confidence, CandidateFact, Fact, FactId, FactPatch, MemorySpaceId,
};
use crate::resolver::{DecisionOracle, PromptContext, Resolver};
use crate::similarity::SimilarityScorer;
use crate::storage::{ExportResult, FactFilter, FactStore, HistoryStore, StorageError};

fn lock_err(context: &'static str) -> RevisionError {
    RevisionError::Persistence(StorageError::BackendError(format!(
        "poisoned lock: {context}"
    )))
}

/// Belief-revision and fact-versioning engine.
pub struct RevisionEngine {
    facts: Arc<dyn FactStore>,
    history: Arc<dyn HistoryStore>,
    executor: RevisionExecutor,
    scorer: Option<Arc<dyn SimilarityScorer>>,
    resolver: RwLock<Option<Arc<Resolver>>>,
    slot_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RevisionEngine {
    /// Create an engine over the given stores.
    #[must_use]
    pub fn new(facts: Arc<dyn FactStore>, history: Arc<dyn HistoryStore>) -> Self {
        let executor = RevisionExecutor::new(Arc::clone(&facts), Arc::clone(&history));
        Self {
            facts,
            history,
            executor,
            scorer: None,
            resolver: RwLock::new(None),
            slot_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Inject a similarity scorer. Semantic matching still stays off until
    /// the configuration enables it.
    #[must_use]
    pub fn with_similarity_scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Access the underlying fact store.
    pub fn fact_store(&self) -> &Arc<dyn FactStore> {
        &self.facts
    }

    /// Access the underlying history store.
    pub fn history_store(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    // ─── CRUD ────────────────────────────────────────────────────────────

    /// Store a candidate as a fresh live fact. Not version-aware: no
    /// conflict detection runs and no history is written.
    pub fn store(&self, candidate: CandidateFact) -> RevisionResult<Fact> {
        validate_candidate(&candidate)?;
        let fact = candidate.into_fact(Utc::now());
        self.facts.insert(fact.clone())?;
        debug!(fact = %fact.id, space = %fact.memory_space_id, "fact stored");
        Ok(fact)
    }

    /// Get a fact by id. Missing facts are `None`, not an error.
    pub fn get(&self, space: &MemorySpaceId, id: FactId) -> RevisionResult<Option<Fact>> {
        Ok(self.facts.get(space, id)?)
    }

    /// In-place field overwrite. Orthogonal to the revision pipeline: the
    /// supersession pointers and validity window are untouched and no
    /// revision event is recorded.
    pub fn update(
        &self,
        space: &MemorySpaceId,
        id: FactId,
        patch: FactPatch,
    ) -> RevisionResult<Fact> {
        let mut fact = self
            .facts
            .get(space, id)?
            .ok_or(RevisionError::NotFound { id })?;

        if let Some(confidence) = patch.confidence {
            fact.confidence = validate_confidence(i64::from(confidence))?;
        }
        if let Some(statement) = patch.fact {
            if statement.trim().is_empty() {
                return Err(ValidationError::EmptyStatement.into());
            }
            fact.fact = statement;
        }
        if let Some(fact_type) = patch.fact_type {
            fact.fact_type = fact_type;
        }
        if let Some(object) = patch.object {
            fact.object = Some(object);
        }
        if let Some(source_type) = patch.source_type {
            fact.source_type = source_type;
        }
        if let Some(tags) = patch.tags {
            fact.tags = tags;
        }

        self.facts.update(fact.clone())?;
        Ok(fact)
    }

    /// List facts matching a filter, in insertion order, paginated.
    pub fn list(&self, space: &MemorySpaceId, filter: &FactFilter) -> RevisionResult<Vec<Fact>> {
        Ok(self.facts.list(space, filter)?)
    }

    /// Count facts matching a filter.
    pub fn count(&self, space: &MemorySpaceId, filter: &FactFilter) -> RevisionResult<usize> {
        Ok(self.facts.count(space, filter)?)
    }

    /// Case-insensitive substring search over statement, subject, object,
    /// and tags, combined with the structured filter. Pagination applies
    /// to the search results.
    pub fn search(
        &self,
        space: &MemorySpaceId,
        query: &str,
        filter: &FactFilter,
    ) -> RevisionResult<Vec<Fact>> {
        let pattern = RegexBuilder::new(&regex::escape(query.trim()))
            .case_insensitive(true)
            .build()
            .map_err(|e| RevisionError::Persistence(StorageError::BackendError(e.to_string())))?;

        let unpaged = FactFilter {
            limit: None,
            offset: 0,
            ..filter.clone()
        };

        let matching = self
            .facts
            .list(space, &unpaged)?
            .into_iter()
            .filter(|f| {
                pattern.is_match(&f.fact)
                    || pattern.is_match(&f.subject)
                    || f.object.as_deref().is_some_and(|o| pattern.is_match(o))
                    || f.tags.iter().any(|t| pattern.is_match(t))
            })
            .skip(filter.offset);

        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    /// All facts about a subject (exact match).
    pub fn query_by_subject(
        &self,
        space: &MemorySpaceId,
        subject: &str,
    ) -> RevisionResult<Vec<Fact>> {
        let filter = FactFilter {
            subject: Some(subject.to_string()),
            ..FactFilter::default()
        };
        Ok(self.facts.list(space, &filter)?)
    }

    /// Export facts matching a filter, with a blake3 checksum over the
    /// canonical JSON for integrity verification downstream.
    pub fn export(
        &self,
        space: &MemorySpaceId,
        filter: &FactFilter,
    ) -> RevisionResult<ExportResult> {
        let facts = self.facts.list(space, filter)?;
        let canonical = serde_json::to_vec(&facts).map_err(|e| {
            RevisionError::Persistence(StorageError::SerializationError(e.to_string()))
        })?;
        let checksum = blake3::hash(&canonical).to_hex().to_string();

        Ok(ExportResult {
            memory_space_id: space.clone(),
            count: facts.len(),
            facts,
            checksum,
            exported_at: Utc::now(),
        })
    }

    // ─── Belief revision ─────────────────────────────────────────────────

    /// Configure the decision oracle and options for this engine instance.
    pub fn configure_belief_revision(
        &self,
        oracle: Arc<dyn DecisionOracle>,
        config: Option<RevisionConfig>,
    ) -> RevisionResult<()> {
        let config = config.unwrap_or_default();
        config.validate()?;
        let mut slot = self
            .resolver
            .write()
            .map_err(|_| lock_err("engine.configure"))?;
        *slot = Some(Arc::new(Resolver::new(oracle, config)));
        info!("belief revision configured");
        Ok(())
    }

    /// Check a candidate for conflicts without deciding anything.
    ///
    /// Works unconfigured; an unconfigured engine uses default matching
    /// options.
    pub fn check_conflicts(&self, candidate: &CandidateFact) -> RevisionResult<ConflictReport> {
        validate_candidate(candidate)?;
        let config = self.current_config()?;
        let corpus = self.facts.find_live(&candidate.memory_space_id)?;
        let detector = ConflictDetector::new(&config, self.scorer.clone());
        Ok(detector.check(candidate, &corpus))
    }

    /// Run the full pipeline for a candidate: detect conflicts, ask the
    /// oracle, apply its decision.
    ///
    /// # Errors
    /// `NotConfigured` before any matching work when no oracle is set;
    /// resolver errors abort with no mutation.
    pub fn revise(&self, candidate: CandidateFact) -> RevisionResult<RevisionOutcome> {
        let resolver = self
            .resolver
            .read()
            .map_err(|_| lock_err("engine.revise"))?
            .clone()
            .ok_or(RevisionError::NotConfigured)?;

        validate_candidate(&candidate)?;

        let slot_key = candidate_slot_key(&candidate);
        let token = self.slot_token(slot_key)?;
        let _guard = token.lock().map_err(|_| lock_err("engine.slot"))?;

        let corpus = self.facts.find_live(&candidate.memory_space_id)?;
        let detector = ConflictDetector::new(resolver.config(), self.scorer.clone());
        let report = detector.check(&candidate, &corpus);

        let context = PromptContext {
            slot_conflicts: facts_for(&report, &corpus, true),
            semantic_conflicts: facts_for(&report, &corpus, false),
            recommended_action: report.recommended_action,
            candidate: candidate.clone(),
        };

        let decision = resolver.resolve(&context)?;
        let outcome = self.executor.apply(candidate, &decision)?;

        info!(
            action = %outcome.action,
            fact = outcome.fact.as_ref().map(|f| f.id.to_string()),
            invalidated = outcome.invalidated.len(),
            "revision applied"
        );
        Ok(outcome)
    }

    /// Manually supersede `old_id` with `new_id`, bypassing detection.
    pub fn supersede(
        &self,
        space: &MemorySpaceId,
        old_id: FactId,
        new_id: FactId,
        reason: Option<String>,
    ) -> RevisionResult<Superseded> {
        let old = self
            .facts
            .get(space, old_id)?
            .ok_or(RevisionError::NotFound { id: old_id })?;

        let slot_key = fact_slot_key(&old);
        let token = self.slot_token(slot_key)?;
        let _guard = token.lock().map_err(|_| lock_err("engine.slot"))?;

        self.executor.supersede(space, old_id, new_id, reason)
    }

    /// The ordered supersession chain containing `fact_id`, earliest
    /// first.
    pub fn get_supersession_chain(
        &self,
        space: &MemorySpaceId,
        fact_id: FactId,
    ) -> RevisionResult<Vec<Fact>> {
        ChainWalker::new(Arc::clone(&self.facts)).chain(space, fact_id)
    }

    /// All revision events recorded for a fact, in chronological order.
    pub fn history(&self, fact_id: FactId) -> RevisionResult<Vec<RevisionEvent>> {
        Ok(self.history.history(fact_id)?)
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn current_config(&self) -> RevisionResult<RevisionConfig> {
        let guard = self
            .resolver
            .read()
            .map_err(|_| lock_err("engine.config"))?;
        Ok(guard
            .as_ref()
            .map(|r| r.config().clone())
            .unwrap_or_default())
    }

    fn slot_token(&self, key: String) -> RevisionResult<Arc<Mutex<()>>> {
        let mut locks = self
            .slot_locks
            .lock()
            .map_err(|_| lock_err("engine.slot_table"))?;
        Ok(Arc::clone(locks.entry(key).or_default()))
    }
}

fn validate_candidate(candidate: &CandidateFact) -> Result<(), ValidationError> {
    // Builders already validate, but candidates can arrive deserialized;
    // the engine must not trust inputs.
    if candidate.memory_space_id.as_str().trim().is_empty() {
        return Err(ValidationError::EmptyMemorySpace);
    }
    if candidate.fact.trim().is_empty() {
        return Err(ValidationError::EmptyStatement);
    }
    if candidate.subject.trim().is_empty() {
        return Err(ValidationError::EmptySubject);
    }
    validate_confidence(i64::from(candidate.confidence))?;
    Ok(())
}

fn candidate_slot_key(candidate: &CandidateFact) -> String {
    slot_key(
        &candidate.memory_space_id,
        &candidate.subject,
        candidate.slot_predicate().as_deref(),
    )
}

fn fact_slot_key(fact: &Fact) -> String {
    slot_key(
        &fact.memory_space_id,
        &fact.subject,
        fact.slot_predicate().as_deref(),
    )
}

fn slot_key(space: &MemorySpaceId, subject: &str, predicate: Option<&str>) -> String {
    format!("{space}\u{1f}{subject}\u{1f}{}", predicate.unwrap_or(""))
}

fn facts_for(report: &ConflictReport, corpus: &[Fact], slot: bool) -> Vec<Fact> {
    let candidates = if slot {
        &report.slot_conflicts
    } else {
        &report.semantic_conflicts
    };
    candidates
        .iter()
        .filter_map(|c| corpus.iter().find(|f| f.id == c.fact_id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RevisionAction;
    use crate::resolver::RuleOracle;
    use crate::storage::{InMemoryFactStore, InMemoryHistoryLog};

    fn space() -> MemorySpaceId {
        MemorySpaceId::new("s1").unwrap()
    }

    fn engine() -> RevisionEngine {
        RevisionEngine::new(
            Arc::new(InMemoryFactStore::new()),
            Arc::new(InMemoryHistoryLog::new()),
        )
    }

    fn candidate(object: &str, confidence: u16) -> CandidateFact {
        let mut c = CandidateFact::builder()
            .memory_space(space())
            .fact(format!("u1 favorite color is {object}"))
            .subject("u1")
            .predicate("favorite color")
            .confidence(confidence)
            .build()
            .unwrap();
        c.object = Some(object.to_string());
        c
    }

    #[test]
    fn test_revise_unconfigured_fails_before_matching() {
        let engine = engine();
        let err = engine.revise(candidate("blue", 90)).unwrap_err();
        assert!(matches!(err, RevisionError::NotConfigured));
    }

    #[test]
    fn test_check_conflicts_works_unconfigured() {
        let engine = engine();
        let report = engine.check_conflicts(&candidate("blue", 90)).unwrap();
        assert!(!report.has_conflicts);
    }

    #[test]
    fn test_store_and_get() {
        let engine = engine();
        let fact = engine.store(candidate("blue", 90)).unwrap();
        let got = engine.get(&space(), fact.id).unwrap().unwrap();
        assert_eq!(got.id, fact.id);
        assert!(engine.get(&space(), FactId::new()).unwrap().is_none());
    }

    #[test]
    fn test_update_does_not_touch_history_or_links() {
        let engine = engine();
        let fact = engine.store(candidate("blue", 90)).unwrap();

        for step in 1..=10u16 {
            let patch = FactPatch {
                confidence: Some(step * 9),
                ..FactPatch::default()
            };
            engine.update(&space(), fact.id, patch).unwrap();
        }

        let updated = engine.get(&space(), fact.id).unwrap().unwrap();
        assert_eq!(updated.confidence, 90);
        assert!(updated.superseded_by.is_none());
        assert!(updated.valid_until.is_none());
        assert!(engine.history(fact.id).unwrap().is_empty());
    }

    #[test]
    fn test_update_validates_confidence() {
        let engine = engine();
        let fact = engine.store(candidate("blue", 90)).unwrap();
        let patch = FactPatch {
            confidence: Some(140),
            ..FactPatch::default()
        };
        assert!(matches!(
            engine.update(&space(), fact.id, patch),
            Err(RevisionError::Validation(_))
        ));
    }

    #[test]
    fn test_revise_supersede_full_pipeline() {
        let engine = engine();
        engine
            .configure_belief_revision(Arc::new(RuleOracle::new()), None)
            .unwrap();

        let old = engine.store(candidate("blue", 90)).unwrap();
        let outcome = engine.revise(candidate("purple", 95)).unwrap();

        assert_eq!(outcome.action, RevisionAction::Supersede);
        let new = outcome.fact.unwrap();
        assert_eq!(new.supersedes, Some(old.id));

        let old_now = engine.get(&space(), old.id).unwrap().unwrap();
        assert!(!old_now.is_live());

        // Exactly one live fact for the slot.
        let live = engine.fact_store().find_live(&space()).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, new.id);
    }

    #[test]
    fn test_revise_duplicate_is_ignored() {
        let engine = engine();
        engine
            .configure_belief_revision(Arc::new(RuleOracle::new()), None)
            .unwrap();

        let existing = engine.store(candidate("blue", 90)).unwrap();
        let outcome = engine.revise(candidate("blue", 85)).unwrap();

        assert_eq!(outcome.action, RevisionAction::Ignore);
        assert!(outcome.fact.is_none());
        let events = engine.history(existing.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, RevisionAction::Ignore);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let engine = engine();
        engine.store(candidate("Navy Blue", 90)).unwrap();
        engine.store(candidate("crimson", 70)).unwrap();

        let hits = engine
            .search(&space(), "navy blue", &FactFilter::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].object.as_deref(), Some("Navy Blue"));
    }

    #[test]
    fn test_export_checksum_is_stable() {
        let engine = engine();
        engine.store(candidate("blue", 90)).unwrap();

        let a = engine.export(&space(), &FactFilter::default()).unwrap();
        let b = engine.export(&space(), &FactFilter::default()).unwrap();
        assert_eq!(a.count, 1);
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.checksum.len(), 64);
    }

    #[test]
    fn test_engines_are_independently_configured() {
        let a = engine();
        let b = engine();
        a.configure_belief_revision(Arc::new(RuleOracle::new()), None)
            .unwrap();

        assert!(a.revise(candidate("blue", 90)).is_ok());
        assert!(matches!(
            b.revise(candidate("blue", 90)),
            Err(RevisionError::NotConfigured)
        ));
    }
}
