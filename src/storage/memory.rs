//! In-memory storage backend.
//!
//! Thread-safe reference implementations of the storage traits, intended
//! for embedded usage and tests. Insertion order is preserved per memory
//! space so listings and histories read chronologically.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::event::RevisionEvent;
use crate::fact::{Fact, FactId, MemorySpaceId};
use crate::storage::traits::{FactFilter, FactStore, HistoryStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct SpaceState {
    by_id: HashMap<FactId, Fact>,
    order: Vec<FactId>,
}

#[derive(Debug, Default)]
struct FactState {
    spaces: HashMap<MemorySpaceId, SpaceState>,
}

/// Thread-safe in-memory fact store.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    state: RwLock<FactState>,
}

impl InMemoryFactStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FactStore for InMemoryFactStore {
    fn insert(&self, fact: Fact) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("fact.insert"))?;
        let space = state.spaces.entry(fact.memory_space_id.clone()).or_default();
        if space.by_id.contains_key(&fact.id) {
            return Err(StorageError::DuplicateKey(fact.id.to_string()));
        }
        space.order.push(fact.id);
        space.by_id.insert(fact.id, fact);
        Ok(())
    }

    fn get(&self, space: &MemorySpaceId, id: FactId) -> Result<Option<Fact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.get"))?;
        Ok(state
            .spaces
            .get(space)
            .and_then(|s| s.by_id.get(&id))
            .cloned())
    }

    fn update(&self, fact: Fact) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("fact.update"))?;
        let space = state
            .spaces
            .get_mut(&fact.memory_space_id)
            .ok_or(StorageError::FactNotFound(fact.id))?;
        let slot = space
            .by_id
            .get_mut(&fact.id)
            .ok_or(StorageError::FactNotFound(fact.id))?;
        *slot = fact;
        Ok(())
    }

    fn remove(&self, space: &MemorySpaceId, id: FactId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("fact.remove"))?;
        let space = state
            .spaces
            .get_mut(space)
            .ok_or(StorageError::FactNotFound(id))?;
        if space.by_id.remove(&id).is_none() {
            return Err(StorageError::FactNotFound(id));
        }
        space.order.retain(|fid| *fid != id);
        Ok(())
    }

    fn list(&self, space: &MemorySpaceId, filter: &FactFilter) -> Result<Vec<Fact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.list"))?;
        let Some(space) = state.spaces.get(space) else {
            return Ok(Vec::new());
        };

        let matching = space
            .order
            .iter()
            .filter_map(|id| space.by_id.get(id))
            .filter(|f| filter.matches(f))
            .skip(filter.offset);

        Ok(match filter.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    fn count(&self, space: &MemorySpaceId, filter: &FactFilter) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.count"))?;
        let Some(space) = state.spaces.get(space) else {
            return Ok(0);
        };
        Ok(space.by_id.values().filter(|f| filter.matches(f)).count())
    }

    fn find_live(&self, space: &MemorySpaceId) -> Result<Vec<Fact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.find_live"))?;
        let Some(space) = state.spaces.get(space) else {
            return Ok(Vec::new());
        };
        Ok(space
            .order
            .iter()
            .filter_map(|id| space.by_id.get(id))
            .filter(|f| f.is_live())
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct HistoryState {
    events: Vec<RevisionEvent>,
    by_fact: HashMap<FactId, Vec<usize>>,
}

impl HistoryState {
    fn push(&mut self, event: RevisionEvent) {
        let idx = self.events.len();
        self.by_fact.entry(event.fact_id).or_default().push(idx);
        self.events.push(event);
    }
}

/// Thread-safe in-memory append-only history log.
#[derive(Debug, Default)]
pub struct InMemoryHistoryLog {
    state: RwLock<HistoryState>,
}

impl InMemoryHistoryLog {
    /// Create a new empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events in the log, across all facts.
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("history.len"))?;
        Ok(state.events.len())
    }

    /// Returns true if the log holds no events.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl HistoryStore for InMemoryHistoryLog {
    fn append(&self, event: RevisionEvent) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("history.append"))?;
        state.push(event);
        Ok(())
    }

    fn append_all(&self, events: Vec<RevisionEvent>) -> Result<(), StorageError> {
        // One write lock for the whole batch: all land or none do.
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("history.append_all"))?;
        for event in events {
            state.push(event);
        }
        Ok(())
    }

    fn history(&self, fact_id: FactId) -> Result<Vec<RevisionEvent>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("history.history"))?;
        Ok(state
            .by_fact
            .get(&fact_id)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&i| state.events.get(i))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RevisionAction;
    use crate::fact::{CandidateFact, FactType};

    fn space() -> MemorySpaceId {
        MemorySpaceId::new("s1").unwrap()
    }

    fn make_fact(subject: &str, confidence: u16) -> Fact {
        CandidateFact::builder()
            .memory_space(space())
            .fact(format!("{subject} statement"))
            .subject(subject)
            .predicate("p")
            .confidence(confidence)
            .build()
            .unwrap()
            .into_fact(chrono::Utc::now())
    }

    #[test]
    fn test_insert_get_round_trip() {
        let store = InMemoryFactStore::new();
        let fact = make_fact("u1", 80);
        let id = fact.id;

        store.insert(fact).unwrap();
        let got = store.get(&space(), id).unwrap().unwrap();
        assert_eq!(got.id, id);
    }

    #[test]
    fn test_insert_duplicate_key() {
        let store = InMemoryFactStore::new();
        let fact = make_fact("u1", 80);
        store.insert(fact.clone()).unwrap();
        assert!(matches!(
            store.insert(fact),
            Err(StorageError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_get_missing_is_none_not_error() {
        let store = InMemoryFactStore::new();
        assert!(store.get(&space(), FactId::new()).unwrap().is_none());
    }

    #[test]
    fn test_update_missing_fails() {
        let store = InMemoryFactStore::new();
        let fact = make_fact("u1", 80);
        assert!(matches!(
            store.update(fact),
            Err(StorageError::FactNotFound(_))
        ));
    }

    #[test]
    fn test_spaces_are_isolated() {
        let store = InMemoryFactStore::new();
        let fact = make_fact("u1", 80);
        let id = fact.id;
        store.insert(fact).unwrap();

        let other = MemorySpaceId::new("s2").unwrap();
        assert!(store.get(&other, id).unwrap().is_none());
        assert_eq!(store.find_live(&other).unwrap().len(), 0);
    }

    #[test]
    fn test_list_preserves_insertion_order_and_paginates() {
        let store = InMemoryFactStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let fact = make_fact(&format!("u{i}"), 50);
            ids.push(fact.id);
            store.insert(fact).unwrap();
        }

        let all = store.list(&space(), &FactFilter::default()).unwrap();
        assert_eq!(all.iter().map(|f| f.id).collect::<Vec<_>>(), ids);

        let page = store
            .list(
                &space(),
                &FactFilter {
                    limit: Some(2),
                    offset: 1,
                    ..FactFilter::default()
                },
            )
            .unwrap();
        assert_eq!(page.iter().map(|f| f.id).collect::<Vec<_>>(), ids[1..3]);
    }

    #[test]
    fn test_filter_by_type_confidence_tags() {
        let store = InMemoryFactStore::new();
        let mut a = make_fact("u1", 90);
        a.fact_type = FactType::Preference;
        a.tags.insert("ui".to_string());
        let mut b = make_fact("u1", 40);
        b.fact_type = FactType::Observation;
        store.insert(a.clone()).unwrap();
        store.insert(b).unwrap();

        // All enum members must be accepted as filter values.
        for ft in FactType::ALL {
            let filter = FactFilter {
                fact_type: Some(ft),
                ..FactFilter::default()
            };
            store.count(&space(), &filter).unwrap();
        }

        let filter = FactFilter {
            fact_type: Some(FactType::Preference),
            min_confidence: Some(80),
            tags: vec!["ui".to_string()],
            ..FactFilter::default()
        };
        let got = store.list(&space(), &filter).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, a.id);
    }

    #[test]
    fn test_find_live_excludes_superseded() {
        let store = InMemoryFactStore::new();
        let mut old = make_fact("u1", 80);
        let new = make_fact("u1", 90);
        old.mark_superseded(new.id, chrono::Utc::now());
        store.insert(old).unwrap();
        store.insert(new.clone()).unwrap();

        let live = store.find_live(&space()).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, new.id);
    }

    #[test]
    fn test_remove_for_compensation() {
        let store = InMemoryFactStore::new();
        let fact = make_fact("u1", 80);
        let id = fact.id;
        store.insert(fact).unwrap();
        store.remove(&space(), id).unwrap();
        assert!(store.get(&space(), id).unwrap().is_none());
        assert!(matches!(
            store.remove(&space(), id),
            Err(StorageError::FactNotFound(_))
        ));
    }

    #[test]
    fn test_history_chronological_per_fact() {
        let log = InMemoryHistoryLog::new();
        let fact_id = FactId::new();
        let other = FactId::new();

        log.append(RevisionEvent::new(fact_id, RevisionAction::Add, 70))
            .unwrap();
        log.append(RevisionEvent::new(other, RevisionAction::Add, 50))
            .unwrap();
        log.append(
            RevisionEvent::new(fact_id, RevisionAction::Supersede, 90)
                .with_superseded_by(FactId::new()),
        )
        .unwrap();

        let events = log.history(fact_id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, RevisionAction::Add);
        assert_eq!(events[1].action, RevisionAction::Supersede);
    }

    #[test]
    fn test_append_all_batch() {
        let log = InMemoryHistoryLog::new();
        let a = FactId::new();
        let b = FactId::new();
        log.append_all(vec![
            RevisionEvent::new(a, RevisionAction::Merge, 85).with_superseded_by(b),
            RevisionEvent::new(b, RevisionAction::Merge, 85),
        ])
        .unwrap();

        assert_eq!(log.len().unwrap(), 2);
        assert_eq!(log.history(a).unwrap().len(), 1);
        assert_eq!(log.history(b).unwrap().len(), 1);
    }

    #[test]
    fn test_history_of_unknown_fact_is_empty() {
        let log = InMemoryHistoryLog::new();
        assert!(log.history(FactId::new()).unwrap().is_empty());
    }
}
