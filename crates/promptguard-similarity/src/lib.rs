//! Sentence-level similarity screening of prompts.
//!
//! [`SimilarityEngine::run`] splits the input into sentences, embeds each
//! one, searches the active backend, and folds the hits into one
//! [`PipelineResult`]. Sentences are processed in batches: the batches run
//! one after another, the sentences inside a batch run concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use promptguard_core::error::{Error, Result};
use promptguard_core::segment::SentenceSegmenter;
use promptguard_core::settings::Settings;
use promptguard_core::traits::Embedder;
use promptguard_core::types::{Candidate, PipelineResult, SearchHit, ThresholdPolicy, TriggeredRule};
use promptguard_vector::{BackendRegistry, SearchBackend};

pub const PIPELINE_NAME: &str = "similarity";
pub const DEFAULT_BATCH_SIZE: usize = 5;

pub struct SimilarityEngine {
    registry: Arc<BackendRegistry>,
    embedder: Option<Arc<dyn Embedder>>,
    segmenter: SentenceSegmenter,
    policy: ThresholdPolicy,
    batch_size: usize,
    run_timeout: Option<Duration>,
}

impl SimilarityEngine {
    pub fn new(registry: Arc<BackendRegistry>, embedder: Option<Arc<dyn Embedder>>, policy: ThresholdPolicy) -> Self {
        Self {
            registry,
            embedder,
            segmenter: SentenceSegmenter::default(),
            policy,
            batch_size: DEFAULT_BATCH_SIZE,
            run_timeout: None,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        registry: Arc<BackendRegistry>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self> {
        let sim = &settings.similarity;
        let engine = Self::new(registry, embedder, sim.threshold_policy()?).with_batch_size(sim.batch_size);
        Ok(match sim.run_timeout() {
            Some(limit) => engine.with_run_timeout(limit),
            None => engine,
        })
    }

    /// Sentences handled concurrently; 0 is treated as 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_run_timeout(mut self, limit: Duration) -> Self {
        self.run_timeout = Some(limit);
        self
    }

    pub fn with_segmenter(mut self, segmenter: SentenceSegmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn policy(&self) -> ThresholdPolicy { self.policy }

    pub fn registry(&self) -> &Arc<BackendRegistry> { &self.registry }

    /// Screens `text` against the reference corpus. Never fails: problems
    /// that prevent screening are reported as an `error` status.
    pub async fn run(&self, text: &str) -> PipelineResult {
        let start = Instant::now();
        let outcome = match self.run_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.evaluate(text)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Operation(format!("similarity run exceeded {}ms", limit.as_millis()))),
            },
            None => self.evaluate(text).await,
        };
        match outcome {
            Ok(rules) => {
                let result = PipelineResult::from_rules(PIPELINE_NAME, rules);
                tracing::info!(
                    "Similarity run finished: status={:?} rules={} in {} ms",
                    result.status,
                    result.triggered_rules.len(),
                    start.elapsed().as_millis()
                );
                result
            }
            Err(e) => {
                tracing::error!("Similarity run failed: {}", e);
                PipelineResult::error(PIPELINE_NAME, e.to_string())
            }
        }
    }

    async fn evaluate(&self, text: &str) -> Result<Vec<TriggeredRule>> {
        let active = self.registry.active().ok_or(Error::NoActiveBackend)?;
        let sentences = self.segmenter.segment(text);
        if sentences.is_empty() {
            return Ok(Vec::new());
        }
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| Error::EmbeddingUnavailable("no embedder configured".into()))?;
        tracing::debug!("[{}] {} sentence(s) to screen", active.id, sentences.len());

        let mut candidates = Vec::new();
        for batch in sentences.chunks(self.batch_size) {
            let lookups = batch.iter().map(|s| lookup(embedder.clone(), active.backend.as_ref(), s.clone()));
            for hits in join_all(lookups).await {
                candidates.extend(hits?.into_iter().filter_map(|hit| self.classify(hit)));
            }
        }
        Ok(strongest_per_document(candidates))
    }

    fn classify(&self, hit: SearchHit) -> Option<Candidate> {
        self.policy.classify(hit.score).map(|action| Candidate { hit, action })
    }
}

/// Embedding runs on the blocking pool; the run deadline can fire while it is in progress.
async fn lookup(embedder: Arc<dyn Embedder>, backend: &dyn SearchBackend, sentence: String) -> Result<Vec<SearchHit>> {
    let embedded = tokio::task::spawn_blocking(move || embedder.embed_text(&sentence)).await;
    let vector = match embedded {
        Ok(result) => result.map_err(|e| Error::Operation(format!("embedding failed: {e}")))?,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => return Err(Error::Operation(format!("embedding task cancelled: {e}"))),
    };
    Ok(backend.search_similar(&vector).await)
}

/// One rule per document id, keeping the highest-scoring candidate.
/// Rules come out in first-seen order.
pub fn strongest_per_document(candidates: Vec<Candidate>) -> Vec<TriggeredRule> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Candidate> = Vec::new();
    for c in candidates {
        match position.get(&c.hit.doc_id) {
            Some(&i) => {
                if c.hit.score > kept[i].hit.score {
                    kept[i] = c;
                }
            }
            None => {
                position.insert(c.hit.doc_id.clone(), kept.len());
                kept.push(c);
            }
        }
    }
    kept.into_iter().map(TriggeredRule::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptguard_core::types::RuleAction;

    fn candidate(doc: &str, score: f32, action: RuleAction) -> Candidate {
        Candidate {
            hit: SearchHit { score, category: "c".into(), doc_id: doc.into(), details: String::new(), body: String::new() },
            action,
        }
    }

    #[test]
    fn keeps_highest_score_per_document() {
        let rules = strongest_per_document(vec![
            candidate("a", 0.75, RuleAction::Notify),
            candidate("b", 0.80, RuleAction::Notify),
            candidate("a", 0.92, RuleAction::Block),
            candidate("b", 0.71, RuleAction::Notify),
        ]);
        assert_eq!(rules.len(), 2);
        assert_eq!((rules[0].id.as_str(), rules[0].action), ("a", RuleAction::Block));
        assert_eq!((rules[1].id.as_str(), rules[1].action), ("b", RuleAction::Notify));
    }

    #[test]
    fn no_candidates_no_rules() {
        assert!(strongest_per_document(Vec::new()).is_empty());
    }
}
