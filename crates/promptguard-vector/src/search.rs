//! KNN retry and per-response dedup shared by every backend.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;

use promptguard_core::types::{SearchHit, EMBEDDING_DIM};

use crate::backend::SearchBackend;
use crate::error::{BackendError, Result};

/// Neighbours requested on the first attempt.
pub const PRIMARY_K: usize = 5;
/// Neighbours requested on the degraded retry.
pub const FALLBACK_K: usize = 3;

/// Raw top-k query against the configured index.
#[async_trait]
pub(crate) trait KnnSearch {
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}

/// `false` when the vector cannot be searched at all.
pub(crate) fn check_vector(backend: &str, vector: &[f32]) -> bool {
    if vector.is_empty() {
        tracing::warn!("[{}] empty query vector, skipping search", backend);
        return false;
    }
    if vector.len() != EMBEDDING_DIM {
        tracing::warn!("[{}] query vector has {} dims, index expects {}", backend, vector.len(), EMBEDDING_DIM);
    }
    true
}

pub(crate) async fn similar_with_fallback<B>(backend: &B, vector: &[f32]) -> Vec<SearchHit>
where
    B: SearchBackend + KnnSearch + ?Sized,
{
    let id = backend.id();
    let index = backend.index_name();
    if !check_vector(id, vector) {
        return Vec::new();
    }
    match backend.index_exists(index).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("[{}][{}] index does not exist", id, index);
            return Vec::new();
        }
        Err(e) => {
            tracing::error!("[{}][{}] index check failed: {}", id, index, e);
            return Vec::new();
        }
    }
    let hits = match backend.knn(vector, PRIMARY_K).await {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!("[{}][{}] knn k={} failed, retrying with k={}: {}", id, index, PRIMARY_K, FALLBACK_K, e);
            match backend.knn(vector, FALLBACK_K).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::error!("[{}][{}] fallback knn failed: {}", id, index, e);
                    return Vec::new();
                }
            }
        }
    };
    tracing::debug!("[{}][{}] {} raw hits", id, index, hits.len());
    dedup_by_category(hits)
}

/// Keeps the first hit of every category, preserving order.
pub(crate) fn dedup_by_category(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter().filter(|h| seen.insert(h.category.clone())).collect()
}

/// Document fields as stored next to the vector.
#[derive(Debug, Deserialize)]
pub(crate) struct StoredPayload {
    id: Option<String>,
    category: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl StoredPayload {
    pub(crate) fn into_hit(self, score: f32) -> Result<SearchHit> {
        let doc_id = self.id.filter(|s| !s.is_empty()).ok_or_else(|| BackendError::Query("hit without id".into()))?;
        let category = self
            .category
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BackendError::Query(format!("hit {doc_id} without category")))?;
        Ok(SearchHit {
            score,
            category,
            doc_id,
            details: self.details.unwrap_or_default(),
            body: self.text.unwrap_or_default(),
        })
    }
}
