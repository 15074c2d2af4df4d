//! Abstract storage traits.
//!
//! These traits define the contract that storage backends must implement.
//! By using traits, we enable:
//! - In-memory backends for testing and embedded use
//! - Persistent document stores for production
//!
//! All mutations of a single call are atomic per backend; the multi-write
//! atomicity of a revision decision is the executor's responsibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::RevisionEvent;
use crate::fact::{Fact, FactId, FactType, MemorySpaceId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Fact not found.
    #[error("Fact not found: {0}")]
    FactNotFound(FactId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl StorageError {
    /// Returns true if retrying the same operation may succeed.
    ///
    /// Only connection-level failures qualify; everything else reflects a
    /// state that a retry cannot change.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }
}

/// Filter for list/count/search/export queries.
///
/// Every `FactType` value is a valid filter target; filters never reject
/// defined enum members.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact_type: Option<FactType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// All listed tags must be present on a matching fact.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Minimum confidence, inclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<u8>,

    /// Only live facts when true (default false: all facts).
    #[serde(default)]
    pub live_only: bool,

    /// Pagination: maximum number of facts returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Pagination: facts skipped before the first returned one.
    #[serde(default)]
    pub offset: usize,
}

impl FactFilter {
    /// Returns true if `fact` passes every set criterion (ignoring
    /// pagination, which applies to the result set as a whole).
    #[must_use]
    pub fn matches(&self, fact: &Fact) -> bool {
        if let Some(ft) = self.fact_type {
            if fact.fact_type != ft {
                return false;
            }
        }
        if let Some(subject) = self.subject.as_deref() {
            if fact.subject != subject {
                return false;
            }
        }
        if !self.tags.iter().all(|t| fact.tags.contains(t)) {
            return false;
        }
        if let Some(min) = self.min_confidence {
            if fact.confidence < min {
                return false;
            }
        }
        if self.live_only && !fact.is_live() {
            return false;
        }
        true
    }
}

/// Result of an `export` call: the matching facts plus integrity metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub memory_space_id: MemorySpaceId,
    pub facts: Vec<Fact>,
    pub count: usize,

    /// blake3 hex digest of the canonical JSON of `facts`.
    pub checksum: String,

    pub exported_at: DateTime<Utc>,
}

/// Storage trait for fact records.
///
/// Facts are addressed by `(memory_space_id, fact_id)`; memory spaces are
/// fully isolated from one another.
pub trait FactStore: Send + Sync {
    /// Insert a new fact. Returns an error if the id already exists.
    fn insert(&self, fact: Fact) -> Result<(), StorageError>;

    /// Get a fact by id within a memory space.
    fn get(&self, space: &MemorySpaceId, id: FactId) -> Result<Option<Fact>, StorageError>;

    /// Replace an existing fact record. Returns an error if not found.
    fn update(&self, fact: Fact) -> Result<(), StorageError>;

    /// Remove a fact record. Used only by compensation, never by the
    /// forward revision path.
    fn remove(&self, space: &MemorySpaceId, id: FactId) -> Result<(), StorageError>;

    /// All facts in a memory space matching `filter`, in insertion order,
    /// with pagination applied.
    fn list(&self, space: &MemorySpaceId, filter: &FactFilter) -> Result<Vec<Fact>, StorageError>;

    /// Number of facts matching `filter` (pagination ignored).
    fn count(&self, space: &MemorySpaceId, filter: &FactFilter) -> Result<usize, StorageError>;

    /// All live facts in a memory space, in insertion order.
    fn find_live(&self, space: &MemorySpaceId) -> Result<Vec<Fact>, StorageError>;
}

/// Storage trait for the append-only revision history.
pub trait HistoryStore: Send + Sync {
    /// Append one event.
    fn append(&self, event: RevisionEvent) -> Result<(), StorageError>;

    /// Append a batch of events as one unit: either all land or none do.
    fn append_all(&self, events: Vec<RevisionEvent>) -> Result<(), StorageError>;

    /// All events for a fact, in chronological order.
    fn history(&self, fact_id: FactId) -> Result<Vec<RevisionEvent>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_fact_store_object_safe(_: &dyn FactStore) {}
    fn _assert_history_store_object_safe(_: &dyn HistoryStore) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::FactNotFound(FactId::new());
        assert!(err.to_string().contains("Fact not found"));

        let err = StorageError::BackendError("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::ConnectionError("reset".to_string()).is_transient());
        assert!(!StorageError::DuplicateKey("k".to_string()).is_transient());
        assert!(!StorageError::BackendError("bad".to_string()).is_transient());
    }
}
