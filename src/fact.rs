//! Fact types: the atomic unit of knowledge in credo.
//!
//! A fact is a claim about a subject with explicit confidence, a validity
//! window, and supersession pointers linking it into its revision chain.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Unique identifier for a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(uuid::Uuid);

impl FactId {
    /// Creates a new random fact ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for FactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a revision event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(uuid::Uuid);

impl EventId {
    /// Creates a new random event ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied identifier scoping facts to one memory space (tenant,
/// agent, or test run). Must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemorySpaceId(String);

impl MemorySpaceId {
    /// Creates a memory space id.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyMemorySpace` for empty/whitespace input.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyMemorySpace);
        }
        Ok(Self(id))
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemorySpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The category of knowledge a fact carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Preference,
    Identity,
    Knowledge,
    Relationship,
    Event,
    Observation,
    Custom,
}

impl FactType {
    /// Every defined fact type, in declaration order.
    ///
    /// Filters must accept each of these without rejecting valid members.
    pub const ALL: [FactType; 7] = [
        Self::Preference,
        Self::Identity,
        Self::Knowledge,
        Self::Relationship,
        Self::Event,
        Self::Observation,
        Self::Custom,
    ];
}

impl Default for FactType {
    fn default() -> Self {
        Self::Knowledge
    }
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preference => write!(f, "preference"),
            Self::Identity => write!(f, "identity"),
            Self::Knowledge => write!(f, "knowledge"),
            Self::Relationship => write!(f, "relationship"),
            Self::Event => write!(f, "event"),
            Self::Observation => write!(f, "observation"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// How a fact entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Extracted from conversational content by an external callback.
    Conversation,
    /// Ingested from a document.
    Document,
    /// Produced by an inference step (including MERGE outcomes).
    Inference,
    /// Entered directly by a caller.
    Manual,
    /// Written by the system itself.
    System,
}

impl Default for SourceType {
    fn default() -> Self {
        Self::Manual
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversation => write!(f, "conversation"),
            Self::Document => write!(f, "document"),
            Self::Inference => write!(f, "inference"),
            Self::Manual => write!(f, "manual"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A stored fact.
///
/// `valid_until` and `superseded_by` are set together and only together: a
/// fact is live exactly until it is superseded. The supersession pointers
/// are plain ids, never live references; each fact has at most one direct
/// predecessor and one direct successor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub memory_space_id: MemorySpaceId,

    /// The statement itself.
    pub fact: String,

    pub fact_type: FactType,
    pub subject: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// Confidence in this fact, 0–100.
    pub confidence: u8,

    pub source_type: SourceType,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// When this fact was recorded.
    pub valid_from: DateTime<Utc>,

    /// Present iff the fact has been invalidated (superseded or merged away).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<FactId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<FactId>,
}

impl Fact {
    /// Returns true if this fact is currently considered true.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.superseded_by.is_none() && self.valid_until.is_none()
    }

    /// The normalized predicate used for slot comparison: trimmed,
    /// case-insensitive. `None` when the fact has no predicate; such facts
    /// occupy no slot.
    #[must_use]
    pub fn slot_predicate(&self) -> Option<String> {
        self.predicate
            .as_deref()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
    }

    /// Marks this fact as superseded by another at `at`.
    pub fn mark_superseded(&mut self, by: FactId, at: DateTime<Utc>) {
        self.superseded_by = Some(by);
        self.valid_until = Some(at);
    }
}

impl PartialEq for Fact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Fact {}

impl std::hash::Hash for Fact {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A candidate fact: the input to `store()`, `check_conflicts()`, and
/// `revise()`. It has no id and no validity window yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFact {
    pub memory_space_id: MemorySpaceId,
    pub fact: String,
    #[serde(default)]
    pub fact_type: FactType,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    pub confidence: u8,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl CandidateFact {
    pub fn builder() -> CandidateFactBuilder {
        CandidateFactBuilder::new()
    }

    /// The normalized predicate used for slot comparison.
    #[must_use]
    pub fn slot_predicate(&self) -> Option<String> {
        self.predicate
            .as_deref()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
    }

    /// Materializes this candidate into a fresh live fact.
    #[must_use]
    pub fn into_fact(self, valid_from: DateTime<Utc>) -> Fact {
        Fact {
            id: FactId::new(),
            memory_space_id: self.memory_space_id,
            fact: self.fact,
            fact_type: self.fact_type,
            subject: self.subject,
            predicate: self.predicate,
            object: self.object,
            confidence: self.confidence,
            source_type: self.source_type,
            tags: self.tags,
            valid_from,
            valid_until: None,
            supersedes: None,
            superseded_by: None,
        }
    }
}

/// Builder for creating `CandidateFact` instances.
///
/// Ensures all required fields are set and valid before building.
#[derive(Debug, Default)]
pub struct CandidateFactBuilder {
    memory_space_id: Option<MemorySpaceId>,
    fact: Option<String>,
    fact_type: FactType,
    subject: Option<String>,
    predicate: Option<String>,
    object: Option<String>,
    confidence: Option<u16>,
    source_type: SourceType,
    tags: BTreeSet<String>,
}

impl CandidateFactBuilder {
    /// Creates a new candidate builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the memory space (required).
    #[must_use]
    pub fn memory_space(mut self, space: MemorySpaceId) -> Self {
        self.memory_space_id = Some(space);
        self
    }

    /// Sets the statement text (required).
    #[must_use]
    pub fn fact(mut self, fact: impl Into<String>) -> Self {
        self.fact = Some(fact.into());
        self
    }

    /// Sets the fact type (default: `Knowledge`).
    #[must_use]
    pub fn fact_type(mut self, fact_type: FactType) -> Self {
        self.fact_type = fact_type;
        self
    }

    /// Sets the subject (required).
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the predicate.
    #[must_use]
    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Sets the object.
    #[must_use]
    pub fn object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Sets the confidence, 0–100 (required).
    #[must_use]
    pub fn confidence(mut self, confidence: u16) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Sets the source type (default: `Manual`).
    #[must_use]
    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Builds the candidate.
    ///
    /// # Errors
    /// Returns `ValidationError` if required fields are missing or invalid.
    pub fn build(self) -> Result<CandidateFact, ValidationError> {
        let memory_space_id = self.memory_space_id.ok_or(ValidationError::MissingField {
            field: "memory_space_id".to_string(),
        })?;

        let fact = self.fact.ok_or(ValidationError::MissingField {
            field: "fact".to_string(),
        })?;
        if fact.trim().is_empty() {
            return Err(ValidationError::EmptyStatement);
        }

        let subject = self.subject.ok_or(ValidationError::MissingField {
            field: "subject".to_string(),
        })?;
        if subject.trim().is_empty() {
            return Err(ValidationError::EmptySubject);
        }

        let confidence = self.confidence.ok_or(ValidationError::MissingField {
            field: "confidence".to_string(),
        })?;
        let confidence = validate_confidence(i64::from(confidence))?;

        Ok(CandidateFact {
            memory_space_id,
            fact,
            fact_type: self.fact_type,
            subject,
            predicate: self.predicate,
            object: self.object,
            confidence,
            source_type: self.source_type,
            tags: self.tags,
        })
    }
}

/// Checks a confidence value against the [0, 100] range.
///
/// # Errors
/// Returns `ValidationError::ConfidenceOutOfRange` otherwise.
pub fn validate_confidence(value: i64) -> Result<u8, ValidationError> {
    if (0..=100).contains(&value) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(value as u8)
    } else {
        Err(ValidationError::ConfidenceOutOfRange { value })
    }
}

/// A partial, in-place overwrite of fact fields.
///
/// Patches are orthogonal to the revision pipeline: they never touch the
/// supersession pointers or the validity window, and they write no history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact_type: Option<FactType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// New confidence, 0–100. Validated on apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

impl FactPatch {
    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fact.is_none()
            && self.fact_type.is_none()
            && self.object.is_none()
            && self.confidence.is_none()
            && self.source_type.is_none()
            && self.tags.is_none()
    }
}
