//! In-process backend: brute-force cosine over documents kept in memory.
//!
//! Useful for local runs without a search cluster and as a test double. The
//! id is configurable so several instances can sit in one registry, and
//! reachability can be toggled to simulate an outage.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use promptguard_core::types::{IndexSchema, SearchHit, SimilarityDocument};

use crate::backend::{SearchBackend, MEMORY};
use crate::error::{BackendError, Result};
use crate::search::{similar_with_fallback, KnnSearch};

pub struct MemoryBackend {
    id: String,
    index: String,
    indexes: RwLock<HashMap<String, BTreeMap<String, SimilarityDocument>>>,
    reachable: AtomicBool,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new(index: impl Into<String>) -> Self { Self::with_id(MEMORY, index) }

    pub fn with_id(id: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index: index.into(),
            indexes: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    pub fn set_reachable(&self, reachable: bool) { self.reachable.store(reachable, Ordering::Release); }

    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    pub fn len(&self) -> usize { self.indexes.read().get(&self.index).map_or(0, BTreeMap::len) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn check_up(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BackendError::Connection(format!("{} is closed", self.id)));
        }
        if !self.reachable.load(Ordering::Acquire) {
            return Err(BackendError::Connection(format!("{} is unreachable", self.id)));
        }
        Ok(())
    }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl KnnSearch for MemoryBackend {
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.check_up()?;
        let guard = self.indexes.read();
        let docs = guard
            .get(&self.index)
            .ok_or_else(|| BackendError::Query(format!("index {} does not exist", self.index)))?;
        let mut hits: Vec<SearchHit> = docs
            .values()
            .map(|d| SearchHit {
                score: cosine(vector, &d.vector),
                category: d.category.clone(),
                doc_id: d.id.clone(),
                details: d.details.clone(),
                body: d.text.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { "Memory Client" }
    fn description(&self) -> &str { "In-memory brute-force cosine store" }
    fn index_name(&self) -> &str { &self.index }

    async fn ping(&self) -> bool { self.check_up().is_ok() }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        self.check_up()?;
        Ok(self.indexes.read().contains_key(name))
    }

    async fn create_index(&self, name: &str, _schema: &IndexSchema) -> Result<()> {
        self.check_up()?;
        self.indexes.write().entry(name.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, document: &SimilarityDocument) -> Result<()> {
        self.check_up()?;
        self.indexes
            .write()
            .entry(self.index.clone())
            .or_default()
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn search_similar(&self, vector: &[f32]) -> Vec<SearchHit> {
        similar_with_fallback(self, vector).await
    }

    async fn close(&self) { self.closed.store(true, Ordering::Release); }
}
