//! Embedded LanceDB backend.
//!
//! The connection is opened lazily on first use and cached; `close` drops it.
//! Scores are `1 - cosine distance` so they line up with the HTTP backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use parking_lot::RwLock;

use promptguard_core::types::{IndexSchema, SearchHit, SimilarityDocument};

use crate::backend::{SearchBackend, LANCEDB};
use crate::error::{BackendError, Result};
use crate::schema::similarity_schema;
use crate::search::{similar_with_fallback, KnnSearch};

pub struct LanceBackend {
    uri: String,
    table: String,
    schema: IndexSchema,
    conn: RwLock<Option<Connection>>,
    closed: AtomicBool,
}

impl LanceBackend {
    pub fn new(uri: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            table: table.into(),
            schema: IndexSchema::default(),
            conn: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn uri(&self) -> &str { &self.uri }

    async fn connection(&self) -> Result<Connection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::Connection("database is closed".into()));
        }
        let cached = self.conn.read().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }
        let conn = connect(&self.uri).execute().await?;
        tracing::info!("[{}] opened {}", LANCEDB, self.uri);
        *self.conn.write() = Some(conn.clone());
        Ok(conn)
    }

    async fn has_table(&self, conn: &Connection, name: &str) -> Result<bool> {
        Ok(conn.table_names().execute().await?.iter().any(|t| t == name))
    }

    fn document_batch(&self, document: &SimilarityDocument) -> Result<RecordBatch> {
        if document.vector.len() != self.schema.dimension {
            return Err(BackendError::Query(format!(
                "document {} has {} dims, table expects {}",
                document.id,
                document.vector.len(),
                self.schema.dimension
            )));
        }
        let vectors = vec![Some(document.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>())];
        Ok(RecordBatch::try_new(
            similarity_schema(&self.schema),
            vec![
                Arc::new(StringArray::from(vec![document.id.clone()])),
                Arc::new(StringArray::from(vec![document.text.clone()])),
                Arc::new(StringArray::from(vec![document.category.clone()])),
                Arc::new(StringArray::from(vec![document.details.clone()])),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                    vectors.into_iter(),
                    self.schema.dimension as i32,
                )),
            ],
        )?)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| BackendError::Query(format!("column {name} missing from result")))
}

fn batch_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let categories = string_column(batch, "category")?;
    let details = string_column(batch, "details")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| BackendError::Query("column _distance missing from result".into()))?;
    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if ids.is_null(i) || categories.is_null(i) {
            return Err(BackendError::Query("row without id or category".into()));
        }
        hits.push(SearchHit {
            score: 1.0 - distances.value(i),
            category: categories.value(i).to_string(),
            doc_id: ids.value(i).to_string(),
            details: details.value(i).to_string(),
            body: texts.value(i).to_string(),
        });
    }
    Ok(hits)
}

#[async_trait]
impl KnnSearch for LanceBackend {
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let conn = self.connection().await?;
        let tbl = conn.open_table(&self.table).execute().await?;
        let mut stream = tbl.vector_search(vector.to_vec())?.distance_type(DistanceType::Cosine).limit(k).execute().await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            hits.extend(batch_hits(&batch)?);
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

#[async_trait]
impl SearchBackend for LanceBackend {
    fn id(&self) -> &str { LANCEDB }
    fn name(&self) -> &str { "LanceDB Client" }
    fn description(&self) -> &str { "Embedded LanceDB table (cosine)" }
    fn index_name(&self) -> &str { &self.table }

    async fn ping(&self) -> bool {
        match self.connection().await {
            Ok(conn) => match conn.table_names().execute().await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!("[{}] ping failed: {}", LANCEDB, e);
                    false
                }
            },
            Err(e) => {
                tracing::warn!("[{}] ping failed: {}", LANCEDB, e);
                false
            }
        }
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let conn = self.connection().await?;
        self.has_table(&conn, name).await
    }

    async fn create_index(&self, name: &str, schema: &IndexSchema) -> Result<()> {
        let conn = self.connection().await?;
        if self.has_table(&conn, name).await? {
            tracing::info!("[{}][{}] table already exists", LANCEDB, name);
            return Ok(());
        }
        let schema = similarity_schema(schema);
        let empty = RecordBatchIterator::new(vec![].into_iter(), schema);
        conn.create_table(name, Box::new(empty)).execute().await?;
        tracing::info!("[{}][{}] table created", LANCEDB, name);
        Ok(())
    }

    async fn upsert(&self, document: &SimilarityDocument) -> Result<()> {
        let batch = self.document_batch(document)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let conn = self.connection().await?;
        if !self.has_table(&conn, &self.table).await? {
            conn.create_table(&self.table, reader).execute().await?;
            return Ok(());
        }
        let tbl = conn.open_table(&self.table).execute().await?;
        let mut mi = tbl.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await?;
        Ok(())
    }

    async fn search_similar(&self, vector: &[f32]) -> Vec<SearchHit> {
        similar_with_fallback(self, vector).await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.conn.write().take();
            tracing::info!("[{}] connection released", LANCEDB);
        }
    }
}
