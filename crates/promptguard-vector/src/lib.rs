//! Similarity search backends and the registry that selects between them.
//!
//! Every backend implements [`SearchBackend`]: health check, index
//! management for seeding, and a top-k cosine search that degrades to an
//! empty result instead of failing. The HTTP variants (OpenSearch,
//! Elasticsearch, Qdrant) share one pooled `reqwest` client each; LanceDB
//! runs embedded; the memory backend needs nothing at all.

pub mod backend;
pub mod elasticsearch;
pub mod error;
mod http;
pub mod lance;
pub mod memory;
pub mod opensearch;
pub mod qdrant;
pub mod registry;
pub mod schema;
pub mod search;

pub use backend::SearchBackend;
pub use elasticsearch::ElasticsearchBackend;
pub use error::{BackendError, Result};
pub use lance::LanceBackend;
pub use memory::MemoryBackend;
pub use opensearch::OpenSearchBackend;
pub use qdrant::QdrantBackend;
pub use registry::{ActiveBackend, BackendInfo, BackendRegistry};
