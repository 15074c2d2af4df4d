//! Error types for credo.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages.

use thiserror::Error;
use uuid::Uuid;

use crate::fact::FactId;
use crate::storage::StorageError;

/// Validation errors that occur during input validation.
///
/// Validation always fails before any mutation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Confidence value {value} is out of range [0, 100]")]
    ConfidenceOutOfRange {
        value: i64,
    },

    #[error("Fact statement cannot be empty")]
    EmptyStatement,

    #[error("Memory space id cannot be empty")]
    EmptyMemorySpace,

    #[error("Subject cannot be empty")]
    EmptySubject,

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Similarity threshold {value} is out of range [0.0, 1.0]")]
    InvalidThreshold {
        value: f32,
    },
}

/// Errors produced by the decision oracle or while interpreting its output.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Oracle call timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Oracle call failed: {message}")]
    OracleFailure {
        message: String,
    },

    /// The oracle replied, but the reply is not a usable decision.
    ///
    /// The pipeline never falls back to ADD on a malformed reply; doing so
    /// would mask conflicts.
    #[error("Malformed oracle decision: {reason}")]
    MalformedDecision {
        reason: String,
    },
}

/// Top-level error type for credo.
///
/// This enum encompasses all possible errors that can occur when using the
/// revision engine.
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Belief revision is not configured: call configure_belief_revision first")]
    NotConfigured,

    #[error("Fact not found: {id}")]
    NotFound {
        id: FactId,
    },

    #[error("Fact {id} cannot supersede itself")]
    SelfSupersession {
        id: FactId,
    },

    #[error("Fact {id} is already superseded by {by}")]
    AlreadySuperseded {
        id: FactId,
        by: FactId,
    },

    #[error("Supersession cycle detected at fact {id}")]
    CycleDetected {
        id: FactId,
    },

    #[error("Fact {id} already supersedes {existing}; a fact replaces at most one predecessor")]
    PredecessorConflict {
        id: FactId,
        existing: FactId,
    },

    /// A sub-write failed mid-apply and compensation of the already-applied
    /// writes also failed. Carries enough context for manual reconciliation.
    #[error("Compensation failed (correlation {correlation_id}): {source}; attempted writes: {attempted:?}")]
    CompensationFailed {
        correlation_id: Uuid,
        attempted: Vec<String>,
        source: StorageError,
    },
}

impl RevisionError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a persistence error.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::CompensationFailed { .. })
    }

    /// Returns true if this error is retryable.
    ///
    /// Validation and decision errors won't change on retry; transient
    /// storage I/O and oracle timeouts may.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence(e) => e.is_transient(),
            Self::Resolver(e) => matches!(e, ResolverError::Timeout { .. }),
            _ => false,
        }
    }
}

/// Result type alias for revision operations.
pub type RevisionResult<T> = Result<T, RevisionError>;
