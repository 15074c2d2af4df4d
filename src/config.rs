//! Revision pipeline configuration.
//!
//! Configuration is owned by one engine instance, never process-global,
//! so independently configured instances can coexist (per tenant, per test
//! run).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default similarity threshold when semantic matching is enabled.
pub const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.85;

/// Default time budget for one oracle call.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Semantic matching options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMatchingConfig {
    /// Off by default, even when a similarity scorer is present: enabling
    /// implicitly would silently change conflict outcomes.
    #[serde(default)]
    pub enabled: bool,

    /// Score above which a fact counts as a semantic match, 0–1 scale.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_threshold() -> f32 {
    DEFAULT_SEMANTIC_THRESHOLD
}

impl Default for SemanticMatchingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: DEFAULT_SEMANTIC_THRESHOLD,
        }
    }
}

/// Options recognized by `configure_belief_revision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionConfig {
    /// Slot matching on by default.
    #[serde(default = "default_true")]
    pub slot_matching: bool,

    #[serde(default)]
    pub semantic_matching: SemanticMatchingConfig,

    /// Oracle call timeout. Not serialized; wire configs carry matching
    /// options only.
    #[serde(skip, default = "default_timeout")]
    pub oracle_timeout: Duration,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> Duration {
    DEFAULT_ORACLE_TIMEOUT
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            slot_matching: true,
            semantic_matching: SemanticMatchingConfig::default(),
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }
}

impl RevisionConfig {
    /// Checks option values.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidThreshold` when the semantic
    /// threshold falls outside [0, 1].
    pub fn validate(&self) -> Result<(), ValidationError> {
        let t = self.semantic_matching.threshold;
        if !(0.0..=1.0).contains(&t) || !t.is_finite() {
            return Err(ValidationError::InvalidThreshold { value: t });
        }
        Ok(())
    }
}
