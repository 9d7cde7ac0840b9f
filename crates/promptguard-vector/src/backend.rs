//! The contract every similarity store implements.

use async_trait::async_trait;
use promptguard_core::types::{IndexSchema, SearchHit, SimilarityDocument};

use crate::error::Result;

pub const OPENSEARCH: &str = "opensearch";
pub const ELASTICSEARCH: &str = "elasticsearch";
pub const QDRANT: &str = "qdrant";
pub const LANCEDB: &str = "lancedb";
pub const MEMORY: &str = "memory";

/// A vector store holding the reference corpus.
///
/// `search_similar` never fails: transport and query problems are logged and
/// surface as an empty hit list. Management calls (`index_exists`,
/// `create_index`, `upsert`) report errors so seeding tools can stop early.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Stable identifier used for selection, e.g. `"opensearch"`.
    fn id(&self) -> &str;

    /// Human-readable name for listings.
    fn name(&self) -> &str { self.id() }

    fn description(&self) -> &str;

    /// Index (or collection) searched by `search_similar`.
    fn index_name(&self) -> &str;

    async fn ping(&self) -> bool;

    async fn index_exists(&self, name: &str) -> Result<bool>;

    async fn create_index(&self, name: &str, schema: &IndexSchema) -> Result<()>;

    /// Insert or replace `document` in the configured index, keyed by its id.
    async fn upsert(&self, document: &SimilarityDocument) -> Result<()>;

    /// Top-k hits for `vector`, at most one per category.
    async fn search_similar(&self, vector: &[f32]) -> Vec<SearchHit>;

    /// Release the underlying client. Calling it twice is a no-op.
    async fn close(&self);
}
