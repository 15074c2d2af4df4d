//! Decision resolution.
//!
//! The resolver wraps a pluggable decision oracle (an LLM client or a
//! deterministic rule engine) behind one narrow interface: complete a
//! prompt, get structured text back. The oracle runs on a worker thread and
//! is abandoned on timeout; a timed-out or malformed reply aborts the
//! pipeline rather than defaulting to ADD, so conflicts are never masked.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RevisionConfig;
use crate::error::ResolverError;
use crate::event::RevisionAction;
use crate::fact::{validate_confidence, CandidateFact, Fact, FactId, FactType};

/// The pluggable decision-making capability.
///
/// Implementations must be cheap to share; the resolver clones the handle
/// into a worker thread per call.
pub trait DecisionOracle: Send + Sync {
    /// Complete a prompt, returning structured text containing a JSON
    /// decision object.
    fn complete(&self, prompt: &str) -> Result<String, ResolverError>;
}

/// Fields for the fact a MERGE decision produces. Unset fields fall back
/// to the candidate's values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact_type: Option<FactType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<std::collections::BTreeSet<String>>,
}

/// A concrete, validated decision for one candidate fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: RevisionAction,

    /// The fact being superseded, merged with, or matched as a duplicate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_fact_id: Option<FactId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_fact: Option<MergeFields>,

    /// Decision confidence, 0–100.
    pub confidence: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Everything the oracle sees: the candidate, the full content of every
/// colliding fact, and the heuristic hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
    pub candidate: CandidateFact,
    pub slot_conflicts: Vec<Fact>,
    pub semantic_conflicts: Vec<Fact>,
    pub recommended_action: RevisionAction,
}

const PROMPT_INSTRUCTIONS: &str = "\
You arbitrate belief revision for an agent memory store. Given a candidate \
fact and the existing facts it conflicts with, reply with exactly one JSON \
object and nothing else:
{\"action\": \"ADD\" | \"SUPERSEDE\" | \"MERGE\" | \"IGNORE\", \
\"target_fact_id\": \"<id of the existing fact, required unless ADD>\", \
\"merged_fact\": {\"fact\": \"...\", \"confidence\": 0-100} (MERGE only), \
\"confidence\": 0-100, \"reason\": \"...\"}";

const CONTEXT_MARKER: &str = "Context:";

/// Builds the full prompt text for a context.
#[must_use]
pub fn build_prompt(context: &PromptContext) -> String {
    let body = serde_json::to_string_pretty(context)
        .unwrap_or_else(|_| "{}".to_string());
    format!("{PROMPT_INSTRUCTIONS}\n{CONTEXT_MARKER}\n{body}")
}

/// Recovers the `PromptContext` embedded in a prompt built by
/// `build_prompt`. Rule-based oracles and test doubles use this to answer
/// from the context instead of a model.
pub fn extract_context(prompt: &str) -> Result<PromptContext, ResolverError> {
    let body = prompt
        .split_once(CONTEXT_MARKER)
        .map_or(prompt, |(_, rest)| rest);
    let json = extract_json_object(body).ok_or_else(|| ResolverError::OracleFailure {
        message: "prompt carries no context object".to_string(),
    })?;
    serde_json::from_str(json).map_err(|e| ResolverError::OracleFailure {
        message: format!("unreadable prompt context: {e}"),
    })
}

/// Parses and validates an oracle reply into a `Decision`.
///
/// Tolerates markdown code fences and surrounding chatter by extracting
/// the outermost JSON object.
///
/// # Errors
/// `ResolverError::MalformedDecision` for anything that is not a valid,
/// complete decision.
pub fn parse_decision(reply: &str) -> Result<Decision, ResolverError> {
    let json = extract_json_object(reply).ok_or_else(|| ResolverError::MalformedDecision {
        reason: "reply contains no JSON object".to_string(),
    })?;

    #[derive(Deserialize)]
    struct DecisionWire {
        action: RevisionAction,
        #[serde(default)]
        target_fact_id: Option<FactId>,
        #[serde(default)]
        merged_fact: Option<MergeFields>,
        confidence: i64,
        #[serde(default)]
        reason: Option<String>,
    }

    let wire: DecisionWire =
        serde_json::from_str(json).map_err(|e| ResolverError::MalformedDecision {
            reason: e.to_string(),
        })?;

    let confidence =
        validate_confidence(wire.confidence).map_err(|e| ResolverError::MalformedDecision {
            reason: e.to_string(),
        })?;

    if wire.action != RevisionAction::Add && wire.target_fact_id.is_none() {
        return Err(ResolverError::MalformedDecision {
            reason: format!("{} decision is missing target_fact_id", wire.action),
        });
    }

    if wire.action == RevisionAction::Merge && wire.merged_fact.is_none() {
        return Err(ResolverError::MalformedDecision {
            reason: "MERGE decision is missing merged_fact".to_string(),
        });
    }

    if let Some(c) = wire.merged_fact.as_ref().and_then(|m| m.confidence) {
        validate_confidence(i64::from(c)).map_err(|e| ResolverError::MalformedDecision {
            reason: e.to_string(),
        })?;
    }

    Ok(Decision {
        action: wire.action,
        target_fact_id: wire.target_fact_id,
        merged_fact: wire.merged_fact,
        confidence,
        reason: wire.reason,
    })
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Wraps an oracle with the configured timeout.
pub struct Resolver {
    oracle: Arc<dyn DecisionOracle>,
    config: RevisionConfig,
}

impl Resolver {
    /// Create a resolver over an oracle with the given configuration.
    #[must_use]
    pub fn new(oracle: Arc<dyn DecisionOracle>, config: RevisionConfig) -> Self {
        Self { oracle, config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RevisionConfig {
        &self.config
    }

    /// Send a prompt context to the oracle and parse its decision.
    ///
    /// The oracle call runs on a worker thread; `recv_timeout` on a bounded
    /// channel caps the wait. On timeout the worker is abandoned and no
    /// mutation has happened yet.
    ///
    /// # Errors
    /// `ResolverError::Timeout`, `OracleFailure`, or `MalformedDecision`.
    pub fn resolve(&self, context: &PromptContext) -> Result<Decision, ResolverError> {
        let prompt = build_prompt(context);
        let timeout = self.config.oracle_timeout;

        let (tx, rx) = bounded(1);
        let oracle = Arc::clone(&self.oracle);
        thread::spawn(move || {
            let _ = tx.send(oracle.complete(&prompt));
        });

        let reply = match rx.recv_timeout(timeout) {
            Ok(result) => result?,
            Err(_) => {
                return Err(ResolverError::Timeout {
                    duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
                })
            }
        };

        let decision = parse_decision(&reply)?;
        debug!(action = %decision.action, confidence = decision.confidence, "oracle decision parsed");
        Ok(decision)
    }
}

/// Deterministic rule-based oracle.
///
/// Answers with the heuristic recommendation carried in the prompt context.
/// Useful for tests and for running the pipeline offline without an LLM.
#[derive(Debug, Default)]
pub struct RuleOracle;

impl RuleOracle {
    /// Create a rule oracle.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DecisionOracle for RuleOracle {
    fn complete(&self, prompt: &str) -> Result<String, ResolverError> {
        let context = extract_context(prompt)?;

        let target = context
            .slot_conflicts
            .first()
            .or_else(|| context.semantic_conflicts.first());

        let decision = match context.recommended_action {
            RevisionAction::Add => Decision {
                action: RevisionAction::Add,
                target_fact_id: None,
                merged_fact: None,
                confidence: context.candidate.confidence,
                reason: Some("no conflicting facts".to_string()),
            },
            RevisionAction::Ignore => Decision {
                action: RevisionAction::Ignore,
                target_fact_id: target.map(|f| f.id),
                merged_fact: None,
                confidence: 95,
                reason: Some("duplicate of an existing fact".to_string()),
            },
            RevisionAction::Supersede => Decision {
                action: RevisionAction::Supersede,
                target_fact_id: target.map(|f| f.id),
                merged_fact: None,
                confidence: context.candidate.confidence,
                reason: Some("newer statement for the same slot".to_string()),
            },
            RevisionAction::Merge => {
                let merged_confidence = target
                    .map(|f| f.confidence.max(context.candidate.confidence))
                    .unwrap_or(context.candidate.confidence);
                Decision {
                    action: RevisionAction::Merge,
                    target_fact_id: target.map(|f| f.id),
                    merged_fact: Some(MergeFields {
                        fact: Some(context.candidate.fact.clone()),
                        confidence: Some(merged_confidence),
                        ..MergeFields::default()
                    }),
                    confidence: merged_confidence,
                    reason: Some("semantically equivalent statements combined".to_string()),
                }
            }
        };

        serde_json::to_string(&decision).map_err(|e| ResolverError::OracleFailure {
            message: e.to_string(),
        })
    }
}
