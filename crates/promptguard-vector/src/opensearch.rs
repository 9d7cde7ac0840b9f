//! OpenSearch k-NN backend.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use promptguard_core::settings::HttpBackendSettings;
use promptguard_core::types::{IndexSchema, SearchHit, SimilarityDocument};

use crate::backend::{SearchBackend, OPENSEARCH};
use crate::error::{BackendError, Result};
use crate::http::HttpTransport;
use crate::search::{similar_with_fallback, KnnSearch, StoredPayload};

pub struct OpenSearchBackend {
    index: String,
    http: HttpTransport,
}

impl OpenSearchBackend {
    pub fn new(settings: &HttpBackendSettings, index: impl Into<String>) -> Result<Self> {
        let http = HttpTransport::new(settings)?;
        Ok(Self { index: index.into(), http })
    }
}

pub(crate) fn knn_body(vector: &[f32], k: usize) -> Value {
    json!({
        "size": k,
        "query": { "knn": { "vector": { "vector": vector, "k": k } } }
    })
}

pub(crate) fn mapping_body(schema: &IndexSchema) -> Value {
    let mut properties = serde_json::Map::new();
    for field in IndexSchema::TEXT_FIELDS {
        properties.insert(field.to_string(), json!({ "type": "text" }));
    }
    properties.insert(
        IndexSchema::VECTOR_FIELD.to_string(),
        json!({
            "type": "knn_vector",
            "dimension": schema.dimension,
            "method": { "name": "hnsw", "space_type": "cosinesimil", "engine": "lucene" }
        }),
    );
    json!({
        "settings": { "index": { "knn": true } },
        "mappings": { "properties": properties }
    })
}

pub(crate) fn document_body(document: &SimilarityDocument) -> Value {
    json!({
        "id": document.id,
        "text": document.text,
        "category": document.category,
        "details": document.details,
        "vector": document.vector,
    })
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_score")]
    score: f32,
    #[serde(rename = "_source")]
    source: StoredPayload,
}

/// Decodes a `_search` response; shared with the Elasticsearch backend.
pub(crate) fn decode_hits(value: Value) -> Result<Vec<SearchHit>> {
    let resp: SearchResponse =
        serde_json::from_value(value).map_err(|e| BackendError::Query(format!("unexpected search response: {e}")))?;
    resp.hits.hits.into_iter().map(|h| h.source.into_hit(h.score)).collect()
}

#[async_trait]
impl KnnSearch for OpenSearchBackend {
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let url = self.http.url(&[&self.index, "_search"]);
        tracing::debug!("[{}][{}] knn search k={}", OPENSEARCH, self.index, k);
        let value = self.http.send_json(self.http.request(Method::POST, url)?.json(&knn_body(vector, k))).await?;
        decode_hits(value)
    }
}

#[async_trait]
impl SearchBackend for OpenSearchBackend {
    fn id(&self) -> &str { OPENSEARCH }
    fn name(&self) -> &str { "OpenSearch Client" }
    fn description(&self) -> &str { "OpenSearch k-NN (HNSW, cosine)" }
    fn index_name(&self) -> &str { &self.index }

    async fn ping(&self) -> bool {
        match self.http.reachable(Method::HEAD, self.http.url(&[])).await {
            Ok(up) => up,
            Err(e) => {
                tracing::warn!("[{}] ping failed: {}", OPENSEARCH, e);
                false
            }
        }
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        self.http.reachable(Method::HEAD, self.http.url(&[name])).await
    }

    async fn create_index(&self, name: &str, schema: &IndexSchema) -> Result<()> {
        let rb = self.http.request(Method::PUT, self.http.url(&[name]))?.json(&mapping_body(schema));
        self.http.send_json(rb).await?;
        tracing::info!("[{}][{}] index created", OPENSEARCH, name);
        Ok(())
    }

    async fn upsert(&self, document: &SimilarityDocument) -> Result<()> {
        let mut url = self.http.url(&[&self.index, "_doc", &document.id]);
        url.query_pairs_mut().append_pair("refresh", "true");
        let rb = self.http.request(Method::PUT, url)?.json(&document_body(document));
        self.http.send_json(rb).await?;
        Ok(())
    }

    async fn search_similar(&self, vector: &[f32]) -> Vec<SearchHit> {
        similar_with_fallback(self, vector).await
    }

    async fn close(&self) {
        if self.http.close() {
            tracing::info!("[{}] client closed", OPENSEARCH);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knn_body_uses_requested_k() {
        let body = knn_body(&[0.5, 0.25], 3);
        assert_eq!(body["size"], 3);
        assert_eq!(body["query"]["knn"]["vector"]["k"], 3);
        assert_eq!(body["query"]["knn"]["vector"]["vector"][1], 0.25);
    }

    #[test]
    fn mapping_declares_cosine_hnsw_vector() {
        let body = mapping_body(&IndexSchema::default());
        let vector = &body["mappings"]["properties"]["vector"];
        assert_eq!(vector["type"], "knn_vector");
        assert_eq!(vector["dimension"], 768);
        assert_eq!(vector["method"]["space_type"], "cosinesimil");
        assert_eq!(body["mappings"]["properties"]["category"]["type"], "text");
    }

    #[test]
    fn decodes_search_response() {
        let value = json!({
            "took": 3,
            "hits": { "total": { "value": 2 }, "hits": [
                { "_id": "1", "_score": 0.91, "_source": { "id": "d1", "text": "t1", "category": "bomb", "details": "x" } },
                { "_id": "2", "_score": 0.72, "_source": { "id": "d2", "text": "t2", "category": "jailbreak" } }
            ] }
        });
        let hits = decode_hits(value).expect("hits");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, "d1");
        assert_eq!(hits[0].details, "x");
        assert_eq!(hits[1].category, "jailbreak");
    }

    #[test]
    fn hit_without_category_is_a_query_error() {
        let value = json!({ "hits": { "hits": [ { "_score": 0.9, "_source": { "id": "d1" } } ] } });
        assert!(matches!(decode_hits(value), Err(BackendError::Query(_))));
        assert!(matches!(decode_hits(json!({"error": "boom"})), Err(BackendError::Query(_))));
    }
}
