//! Elasticsearch dense-vector backend.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use promptguard_core::settings::HttpBackendSettings;
use promptguard_core::types::{IndexSchema, SearchHit, SimilarityDocument};

use crate::backend::{SearchBackend, ELASTICSEARCH};
use crate::error::Result;
use crate::http::HttpTransport;
use crate::opensearch::{decode_hits, document_body};
use crate::search::{similar_with_fallback, KnnSearch};

/// Candidates considered per shard for every requested neighbour.
const CANDIDATES_PER_K: usize = 10;

pub struct ElasticsearchBackend {
    index: String,
    http: HttpTransport,
}

impl ElasticsearchBackend {
    pub fn new(settings: &HttpBackendSettings, index: impl Into<String>) -> Result<Self> {
        Ok(Self { index: index.into(), http: HttpTransport::new(settings)? })
    }
}

pub(crate) fn knn_body(vector: &[f32], k: usize) -> Value {
    json!({
        "size": k,
        "knn": {
            "field": IndexSchema::VECTOR_FIELD,
            "query_vector": vector,
            "k": k,
            "num_candidates": k * CANDIDATES_PER_K,
        }
    })
}

pub(crate) fn mapping_body(schema: &IndexSchema) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("id".into(), json!({ "type": "keyword" }));
    properties.insert("category".into(), json!({ "type": "keyword" }));
    properties.insert("text".into(), json!({ "type": "text" }));
    properties.insert("details".into(), json!({ "type": "text" }));
    properties.insert(
        IndexSchema::VECTOR_FIELD.into(),
        json!({ "type": "dense_vector", "dims": schema.dimension, "index": true, "similarity": "cosine" }),
    );
    json!({ "mappings": { "properties": properties } })
}

#[async_trait]
impl KnnSearch for ElasticsearchBackend {
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        tracing::debug!("[{}][{}] knn search k={}", ELASTICSEARCH, self.index, k);
        let rb = self.http.request(Method::POST, self.http.url(&[&self.index, "_search"]))?.json(&knn_body(vector, k));
        decode_hits(self.http.send_json(rb).await?)
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    fn id(&self) -> &str { ELASTICSEARCH }
    fn name(&self) -> &str { "Elasticsearch Client" }
    fn description(&self) -> &str { "Elasticsearch dense_vector kNN (cosine)" }
    fn index_name(&self) -> &str { &self.index }

    async fn ping(&self) -> bool {
        self.http.reachable(Method::HEAD, self.http.url(&[])).await.unwrap_or_else(|e| {
            tracing::warn!("[{}] ping failed: {}", ELASTICSEARCH, e);
            false
        })
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        self.http.reachable(Method::HEAD, self.http.url(&[name])).await
    }

    async fn create_index(&self, name: &str, schema: &IndexSchema) -> Result<()> {
        let rb = self.http.request(Method::PUT, self.http.url(&[name]))?.json(&mapping_body(schema));
        self.http.send_json(rb).await?;
        tracing::info!("[{}][{}] index created", ELASTICSEARCH, name);
        Ok(())
    }

    async fn upsert(&self, document: &SimilarityDocument) -> Result<()> {
        let mut url = self.http.url(&[&self.index, "_doc", &document.id]);
        url.query_pairs_mut().append_pair("refresh", "true");
        self.http.send_json(self.http.request(Method::PUT, url)?.json(&document_body(document))).await?;
        Ok(())
    }

    async fn search_similar(&self, vector: &[f32]) -> Vec<SearchHit> {
        similar_with_fallback(self, vector).await
    }

    async fn close(&self) {
        if self.http.close() {
            tracing::info!("[{}] client closed", ELASTICSEARCH);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_top_level_knn_clause() {
        let body = knn_body(&[1.0, 0.0], 5);
        assert_eq!(body["knn"]["field"], "vector");
        assert_eq!(body["knn"]["k"], 5);
        assert_eq!(body["knn"]["num_candidates"], 50);
        assert!(body.get("query").is_none());
    }

    #[test]
    fn mapping_uses_dense_vector() {
        let body = mapping_body(&IndexSchema { dimension: 768 });
        let v = &body["mappings"]["properties"]["vector"];
        assert_eq!(v["type"], "dense_vector");
        assert_eq!(v["dims"], 768);
        assert_eq!(v["similarity"], "cosine");
    }
}
