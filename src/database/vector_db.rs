use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub const UPSERT_BATCH_SIZE: usize = 400;
pub const DELETE_BATCH_SIZE: usize = 900;
/// Payload key holding the partition a record belongs to.
///
/// Namespaces share one collection and record ids are global to it, so an
/// upsert reusing another namespace's id would overwrite that record. Ids are
/// minted as random v4 UUIDs at ingest time and never taken from callers.
pub const NAMESPACE_FIELD: &str = "namespace";

pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
    #[error("Namespace must not be empty")]
    InvalidNamespace,
    #[error("Vector has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("{failed} of {total} upsert batches failed: {first_error}")]
    PartialUpsert {
        failed: usize,
        total: usize,
        first_error: String,
    },
    #[error("Deleted {deleted} of {total} records before failing: {source_error}")]
    PartialDelete {
        deleted: usize,
        total: usize,
        source_error: String,
    },
}

/// Per-user partition key. Every vector store call is scoped to exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(key: impl Into<String>) -> Result<Self, VectorDBError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(VectorDBError::InvalidNamespace);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// One call against a backend covers one batch.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn upsert_batch(&self, namespace: &Namespace, records: Vec<VectorRecord>) -> Result<(), VectorDBError>;

    async fn query(
        &self,
        namespace: &Namespace,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>, VectorDBError>;

    async fn delete_batch(&self, namespace: &Namespace, ids: &[String]) -> Result<(), VectorDBError>;

    /// Every record of the namespace, up to `limit`. Scores are meaningless here.
    async fn list(&self, namespace: &Namespace, limit: usize) -> Result<Vec<VectorMatch>, VectorDBError>;
}

#[derive(Clone)]
pub struct VectorDB {
    backend: Arc<dyn VectorBackend>,
    dimension: usize,
    upsert_batch_size: usize,
    delete_batch_size: usize,
}

impl VectorDB {
    pub fn new(backend: Arc<dyn VectorBackend>, dimension: usize) -> Self {
        Self {
            backend,
            dimension,
            upsert_batch_size: UPSERT_BATCH_SIZE,
            delete_batch_size: DELETE_BATCH_SIZE,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Writes all records, dispatching every batch at once. Batches that did
    /// succeed stay written when another one fails.
    pub async fn upsert(&self, namespace: &Namespace, records: Vec<VectorRecord>) -> Result<usize, VectorDBError> {
        for record in &records {
            self.check_dimension(&record.vector)?;
        }

        let total_records = records.len();
        let mut batches = Vec::new();
        let mut records = records.into_iter().peekable();
        while records.peek().is_some() {
            batches.push(records.by_ref().take(self.upsert_batch_size).collect::<Vec<_>>());
        }

        let total = batches.len();
        log::info!(
            "Upserting {} records into namespace {} in {} batches",
            total_records,
            namespace,
            total
        );

        let results = join_all(
            batches
                .into_iter()
                .map(|batch| self.backend.upsert_batch(namespace, batch)),
        )
        .await;

        let errors: Vec<VectorDBError> = results.into_iter().filter_map(Result::err).collect();
        if let Some(first) = errors.first() {
            log::error!("{} of {} upsert batches failed for namespace {}", errors.len(), total, namespace);
            return Err(VectorDBError::PartialUpsert {
                failed: errors.len(),
                total,
                first_error: first.to_string(),
            });
        }

        Ok(total_records)
    }

    pub async fn query(
        &self,
        namespace: &Namespace,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>, VectorDBError> {
        self.check_dimension(vector)?;
        let mut matches = self.backend.query(namespace, vector, top_k, include_metadata).await?;
        matches.truncate(top_k);
        Ok(matches)
    }

    /// Deletes ids batch by batch, stopping at the first failing batch.
    pub async fn delete(&self, namespace: &Namespace, ids: &[String]) -> Result<usize, VectorDBError> {
        let total = ids.len();
        let mut deleted = 0;

        for batch in ids.chunks(self.delete_batch_size) {
            if let Err(e) = self.backend.delete_batch(namespace, batch).await {
                log::error!("Delete stopped after {} of {} records in namespace {}: {}", deleted, total, namespace, e);
                return Err(VectorDBError::PartialDelete {
                    deleted,
                    total,
                    source_error: e.to_string(),
                });
            }
            deleted += batch.len();
        }

        log::info!("Deleted {} records from namespace {}", deleted, namespace);
        Ok(deleted)
    }

    pub async fn list(&self, namespace: &Namespace, limit: usize) -> Result<Vec<VectorMatch>, VectorDBError> {
        self.backend.list(namespace, limit).await
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorDBError> {
        if vector.len() != self.dimension {
            return Err(VectorDBError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }
}
