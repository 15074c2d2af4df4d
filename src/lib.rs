//! # credo: belief revision and fact versioning for agent memory
//!
//! credo decides, for a candidate piece of knowledge, whether it should be
//! added as new, supersede an existing fact, be merged with one, or be
//! ignored as a duplicate, while maintaining an append-only audit trail
//! and non-cyclic supersession chains.
//!
//! ## Core Concepts
//!
//! - **Fact**: a claim about a subject with confidence, a validity window,
//!   and supersession pointers
//! - **Slot**: a `(subject, predicate)` pair representing a single-valued
//!   belief position
//! - **Oracle**: the pluggable decision capability (LLM or rule engine)
//!   that turns a conflict report into a decision
//! - **Supersession**: replacing an older fact with a newer one while
//!   preserving both in the audit trail
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use credo::{
//!     CandidateFact, FactType, InMemoryFactStore, InMemoryHistoryLog,
//!     MemorySpaceId, RevisionEngine, RuleOracle,
//! };
//!
//! let engine = RevisionEngine::new(
//!     Arc::new(InMemoryFactStore::new()),
//!     Arc::new(InMemoryHistoryLog::new()),
//! );
//! engine
//!     .configure_belief_revision(Arc::new(RuleOracle::new()), None)
//!     .unwrap();
//!
//! let space = MemorySpaceId::new("tenant-1").unwrap();
//! let candidate = CandidateFact::builder()
//!     .memory_space(space)
//!     .fact("user prefers dark mode")
//!     .fact_type(FactType::Preference)
//!     .subject("user")
//!     .predicate("ui theme")
//!     .object("dark")
//!     .confidence(90)
//!     .build()
//!     .unwrap();
//!
//! let outcome = engine.revise(candidate).unwrap();
//! assert!(outcome.fact.is_some());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod chain;
pub mod config;
pub mod conflict;
pub mod detector;
pub mod engine;
pub mod error;
pub mod event;
pub mod executor;
pub mod fact;
pub mod matcher;
pub mod resolver;
pub mod similarity;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use chain::ChainWalker;
pub use config::{RevisionConfig, SemanticMatchingConfig};
pub use conflict::{ConflictCandidate, ConflictReport, MatchType};
pub use detector::ConflictDetector;
pub use engine::RevisionEngine;
pub use error::{ResolverError, RevisionError, RevisionResult, ValidationError};
pub use event::{RevisionAction, RevisionEvent};
pub use executor::{RevisionExecutor, RevisionOutcome, Superseded};
pub use fact::{
    CandidateFact, EventId, Fact, FactId, FactPatch, FactType, MemorySpaceId, SourceType,
};
pub use matcher::{SemanticMatcher, SlotMatcher};
pub use resolver::{Decision, DecisionOracle, MergeFields, PromptContext, Resolver, RuleOracle};
pub use similarity::{LexicalSimilarity, SimilarityScorer};
pub use storage::{
    ExportResult, FactFilter, FactStore, HistoryStore, InMemoryFactStore, InMemoryHistoryLog,
    StorageError,
};
