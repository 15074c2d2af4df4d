//! Supersession chain reconstruction.
//!
//! Chains are parent-pointer structures: plain id fields, never live
//! references. The walker re-checks for cycles and runaway depth on every
//! traversal even though the write paths are designed to never produce
//! them.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{RevisionError, RevisionResult};
use crate::executor::MAX_CHAIN_HOPS;
use crate::fact::{Fact, FactId, MemorySpaceId};
use crate::storage::{FactStore, StorageError};

/// Reconstructs the full supersession chain containing a fact.
pub struct ChainWalker {
    facts: Arc<dyn FactStore>,
}

impl ChainWalker {
    /// Create a walker over a fact store.
    #[must_use]
    pub fn new(facts: Arc<dyn FactStore>) -> Self {
        Self { facts }
    }

    /// The ordered chain through `fact_id`, earliest ancestor first,
    /// latest descendant last.
    ///
    /// # Errors
    /// `NotFound` if the fact is missing; `CycleDetected` if a pointer
    /// revisits an id or the chain exceeds the hop bound; `Persistence`
    /// for a dangling pointer (an ancestor hard-deleted out from under the
    /// chain) or backend failure.
    pub fn chain(&self, space: &MemorySpaceId, fact_id: FactId) -> RevisionResult<Vec<Fact>> {
        let start = self
            .facts
            .get(space, fact_id)?
            .ok_or(RevisionError::NotFound { id: fact_id })?;

        let mut visited = HashSet::from([start.id]);

        // Ancestors, nearest first.
        let mut ancestors = Vec::new();
        let mut cursor = start.supersedes;
        while let Some(id) = cursor {
            let fact = self.step(space, id, &mut visited, ancestors.len())?;
            cursor = fact.supersedes;
            ancestors.push(fact);
        }

        // Descendants, nearest first.
        let mut descendants = Vec::new();
        let mut cursor = start.superseded_by;
        while let Some(id) = cursor {
            let fact = self.step(space, id, &mut visited, descendants.len())?;
            cursor = fact.superseded_by;
            descendants.push(fact);
        }

        let mut chain = Vec::with_capacity(ancestors.len() + 1 + descendants.len());
        chain.extend(ancestors.into_iter().rev());
        chain.push(start);
        chain.extend(descendants);
        Ok(chain)
    }

    fn step(
        &self,
        space: &MemorySpaceId,
        id: FactId,
        visited: &mut HashSet<FactId>,
        hops: usize,
    ) -> RevisionResult<Fact> {
        if !visited.insert(id) || hops >= MAX_CHAIN_HOPS {
            return Err(RevisionError::CycleDetected { id });
        }
        self.facts
            .get(space, id)?
            .ok_or_else(|| RevisionError::Persistence(StorageError::FactNotFound(id)))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::fact::CandidateFact;
    use crate::storage::InMemoryFactStore;

    fn space() -> MemorySpaceId {
        MemorySpaceId::new("s1").unwrap()
    }

    fn fact(statement: &str) -> Fact {
        CandidateFact::builder()
            .memory_space(space())
            .fact(statement)
            .subject("u1")
            .predicate("p")
            .confidence(80)
            .build()
            .unwrap()
            .into_fact(Utc::now())
    }

    fn link(older: &mut Fact, newer: &mut Fact) {
        older.superseded_by = Some(newer.id);
        older.valid_until = Some(Utc::now());
        newer.supersedes = Some(older.id);
    }

    #[test]
    fn test_single_fact_chain() {
        let store = Arc::new(InMemoryFactStore::new());
        let f = fact("alone");
        store.insert(f.clone()).unwrap();

        let walker = ChainWalker::new(store);
        let chain = walker.chain(&space(), f.id).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].id, f.id);
    }

    #[test]
    fn test_three_link_chain_from_any_member() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut a = fact("first");
        let mut b = fact("second");
        let mut c = fact("third");
        link(&mut a, &mut b);
        link(&mut b, &mut c);
        store.insert(a.clone()).unwrap();
        store.insert(b.clone()).unwrap();
        store.insert(c.clone()).unwrap();

        let walker = ChainWalker::new(store);
        let expected = vec![a.id, b.id, c.id];
        for member in [a.id, b.id, c.id] {
            let chain = walker.chain(&space(), member).unwrap();
            let ids: Vec<FactId> = chain.iter().map(|f| f.id).collect();
            assert_eq!(ids, expected, "walk from {member}");
        }
    }

    #[test]
    fn test_missing_fact_is_not_found() {
        let walker = ChainWalker::new(Arc::new(InMemoryFactStore::new()));
        assert!(matches!(
            walker.chain(&space(), FactId::new()),
            Err(RevisionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_corrupted_cycle_is_detected() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut a = fact("first");
        let mut b = fact("second");
        // Hand-corrupt the store: a and b supersede each other.
        a.supersedes = Some(b.id);
        b.supersedes = Some(a.id);
        store.insert(a.clone()).unwrap();
        store.insert(b).unwrap();

        let walker = ChainWalker::new(store);
        assert!(matches!(
            walker.chain(&space(), a.id),
            Err(RevisionError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_dangling_pointer_surfaces_persistence_error() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut a = fact("orphan");
        a.supersedes = Some(FactId::new());
        store.insert(a.clone()).unwrap();

        let walker = ChainWalker::new(store);
        assert!(matches!(
            walker.chain(&space(), a.id),
            Err(RevisionError::Persistence(_))
        ));
    }
}
