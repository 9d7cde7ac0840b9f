//! Qdrant collection backend over the REST API.

use std::hash::Hasher;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use twox_hash::XxHash64;

use promptguard_core::settings::HttpBackendSettings;
use promptguard_core::types::{IndexSchema, SearchHit, SimilarityDocument};

use crate::backend::{SearchBackend, QDRANT};
use crate::error::{BackendError, Result};
use crate::http::HttpTransport;
use crate::search::{similar_with_fallback, KnnSearch, StoredPayload};

pub struct QdrantBackend {
    collection: String,
    /// Hits at or below this score are filtered server-side.
    score_threshold: f32,
    http: HttpTransport,
}

impl QdrantBackend {
    pub fn new(settings: &HttpBackendSettings, collection: impl Into<String>, score_threshold: f32) -> Result<Self> {
        Ok(Self { collection: collection.into(), score_threshold, http: HttpTransport::new(settings)? })
    }
}

/// Numeric point id for a document id; stable across runs.
pub fn point_id(doc_id: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(doc_id.as_bytes());
    hasher.finish()
}

pub(crate) fn search_body(vector: &[f32], k: usize, score_threshold: f32) -> Value {
    json!({
        "vector": vector,
        "limit": k,
        "with_payload": true,
        "score_threshold": score_threshold,
    })
}

pub(crate) fn collection_body(schema: &IndexSchema) -> Value {
    json!({ "vectors": { "size": schema.dimension, "distance": "Cosine" } })
}

pub(crate) fn points_body(document: &SimilarityDocument) -> Value {
    json!({
        "points": [{
            "id": point_id(&document.id),
            "vector": document.vector,
            "payload": {
                "id": document.id,
                "text": document.text,
                "category": document.category,
                "details": document.details,
            }
        }]
    })
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: StoredPayload,
}

#[derive(Deserialize)]
struct ExistsResponse {
    result: ExistsResult,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

pub(crate) fn decode_points(value: Value) -> Result<Vec<SearchHit>> {
    let resp: SearchResponse =
        serde_json::from_value(value).map_err(|e| BackendError::Query(format!("unexpected search response: {e}")))?;
    resp.result.into_iter().map(|p| p.payload.into_hit(p.score)).collect()
}

#[async_trait]
impl KnnSearch for QdrantBackend {
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        tracing::debug!("[{}][{}] points search k={} threshold={}", QDRANT, self.collection, k, self.score_threshold);
        let url = self.http.url(&["collections", &self.collection, "points", "search"]);
        let rb = self.http.request(Method::POST, url)?.json(&search_body(vector, k, self.score_threshold));
        decode_points(self.http.send_json(rb).await?)
    }
}

#[async_trait]
impl SearchBackend for QdrantBackend {
    fn id(&self) -> &str { QDRANT }
    fn name(&self) -> &str { "Qdrant Client" }
    fn description(&self) -> &str { "Qdrant HNSW collection (cosine, score threshold pushdown)" }
    fn index_name(&self) -> &str { &self.collection }

    async fn ping(&self) -> bool {
        match self.http.reachable(Method::GET, self.http.url(&["healthz"])).await {
            Ok(up) => up,
            Err(e) => {
                tracing::warn!("[{}] ping failed: {}", QDRANT, e);
                false
            }
        }
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let rb = self.http.request(Method::GET, self.http.url(&["collections", name, "exists"]))?;
        let resp: ExistsResponse = serde_json::from_value(self.http.send_json(rb).await?)
            .map_err(|e| BackendError::Query(format!("unexpected exists response: {e}")))?;
        Ok(resp.result.exists)
    }

    async fn create_index(&self, name: &str, schema: &IndexSchema) -> Result<()> {
        let rb = self.http.request(Method::PUT, self.http.url(&["collections", name]))?.json(&collection_body(schema));
        self.http.send_json(rb).await?;
        tracing::info!("[{}][{}] collection created", QDRANT, name);
        Ok(())
    }

    async fn upsert(&self, document: &SimilarityDocument) -> Result<()> {
        let mut url = self.http.url(&["collections", &self.collection, "points"]);
        url.query_pairs_mut().append_pair("wait", "true");
        self.http.send_json(self.http.request(Method::PUT, url)?.json(&points_body(document))).await?;
        Ok(())
    }

    async fn search_similar(&self, vector: &[f32]) -> Vec<SearchHit> {
        similar_with_fallback(self, vector).await
    }

    async fn close(&self) {
        if self.http.close() {
            tracing::info!("[{}] client closed", QDRANT);
        }
    }
}
