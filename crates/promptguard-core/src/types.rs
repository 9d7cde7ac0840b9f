//! Domain types shared by the segmenter, the search backends and the engine.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Dimensionality every stored and queried vector is expected to have.
pub const EMBEDDING_DIM: usize = 768;

/// Overall verdict of one pipeline run. `Allow` is the "clear" outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Allow,
    Block,
    Notify,
    Error,
}

/// Action attached to a single triggered rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Notify,
    Block,
}

/// One hit returned by a backend for one query vector.
///
/// - `score`: backend similarity score, higher is closer
/// - `category`: label of the stored reference document
/// - `doc_id`: stable id of the stored document
/// - `details`: free-form description stored alongside the document
/// - `body`: the stored reference text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f32,
    pub category: String,
    pub doc_id: String,
    pub details: String,
    pub body: String,
}

/// A hit that survived threshold filtering, with its derived action.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub hit: SearchHit,
    pub action: RuleAction,
}

/// Final output unit of a run: one surfaced match against the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub id: String,
    pub name: String,
    pub details: String,
    pub body: String,
    pub action: RuleAction,
}

impl From<Candidate> for TriggeredRule {
    fn from(c: Candidate) -> Self {
        Self { id: c.hit.doc_id, name: c.hit.category, details: c.hit.details, body: c.hit.body, action: c.action }
    }
}

/// Score cutoffs separating ignore / notify / block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdPolicy {
    notify_threshold: f32,
    block_threshold: f32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self { notify_threshold: 0.7, block_threshold: 0.87 }
    }
}

impl ThresholdPolicy {
    pub fn new(notify_threshold: f32, block_threshold: f32) -> Result<Self> {
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        if !in_range(notify_threshold) || !in_range(block_threshold) {
            return Err(Error::InvalidConfig(format!(
                "thresholds must lie in [0, 1] (notify={notify_threshold}, block={block_threshold})"
            )));
        }
        if notify_threshold > block_threshold {
            return Err(Error::InvalidConfig(format!(
                "notify threshold {notify_threshold} exceeds block threshold {block_threshold}"
            )));
        }
        Ok(Self { notify_threshold, block_threshold })
    }

    pub fn notify_threshold(&self) -> f32 { self.notify_threshold }
    pub fn block_threshold(&self) -> f32 { self.block_threshold }

    /// `None` when the score does not clear the notify threshold.
    pub fn classify(&self, score: f32) -> Option<RuleAction> {
        if score <= self.notify_threshold {
            None
        } else if score >= self.block_threshold {
            Some(RuleAction::Block)
        } else {
            Some(RuleAction::Notify)
        }
    }
}

/// Result of one pipeline run, owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub name: String,
    pub status: ActionStatus,
    pub triggered_rules: Vec<TriggeredRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl PipelineResult {
    /// Builds a result whose status is derived from the rule set:
    /// no rules allow, any block rule blocks, otherwise notify.
    pub fn from_rules(name: impl Into<String>, triggered_rules: Vec<TriggeredRule>) -> Self {
        let status = if triggered_rules.is_empty() {
            ActionStatus::Allow
        } else if triggered_rules.iter().any(|r| r.action == RuleAction::Block) {
            ActionStatus::Block
        } else {
            ActionStatus::Notify
        };
        Self { name: name.into(), status, triggered_rules, details: None }
    }

    pub fn error(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self { name: name.into(), status: ActionStatus::Error, triggered_rules: Vec::new(), details: Some(details.into()) }
    }
}

/// A reference document as stored in a backend index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityDocument {
    pub id: String,
    pub text: String,
    pub category: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub vector: Vec<f32>,
}

/// Shape of a similarity index: `id`, `text`, `category`, `details`, `vector[dimension]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSchema {
    pub dimension: usize,
}

impl Default for IndexSchema {
    fn default() -> Self { Self { dimension: EMBEDDING_DIM } }
}

impl IndexSchema {
    pub const TEXT_FIELDS: [&'static str; 4] = ["id", "text", "category", "details"];
    pub const VECTOR_FIELD: &'static str = "vector";
}
