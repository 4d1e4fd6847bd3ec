use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use super::loader::{self, FileKind, LoaderError};
use super::splitter::TextSplitter;
use super::validation::{self, ValidationError};
use crate::database::vector_db::{Namespace, VectorDB, VectorDBError, VectorRecord};
use crate::database::{Database, DatabaseError};
use crate::llm::embeddings::{EmbeddingError, EmbeddingGenerator};
use crate::llm::semantic_search::ChunkMetadata;
use crate::session::SessionState;

pub const UPLOAD_COST: i64 = 50;
pub const PREVIEW_CHUNKS: usize = 5;
pub const PREVIEW_CHARS: usize = 500;
pub const LIST_PREVIEW_CHARS: usize = 300;
pub const LIST_LIMIT: usize = 10_000;
pub const UNKNOWN_DOCUMENT: &str = "Unknown";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid file: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("No text could be extracted from {0}")]
    NoContent(String),
    #[error("Insufficient balance: {available} coins available, {required} required")]
    InsufficientBalance { available: i64, required: i64 },
    #[error("Failed to embed document: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorDBError),
    #[error(transparent)]
    Database(DatabaseError),
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Document processing task failed: {0}")]
    Task(String),
}

impl From<DatabaseError> for IngestError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::InsufficientBalance { available, required } => {
                IngestError::InsufficientBalance { available, required }
            }
            other => IngestError::Database(other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub file_name: String,
    pub file_type: FileKind,
    pub chunks: usize,
    pub preview: Vec<String>,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub source: String,
    pub chunks: usize,
    pub file_type: Option<String>,
    pub preview: String,
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Indexes uploaded documents into the owner's namespace and manages them.
#[derive(Clone)]
pub struct DocumentIngestor {
    embeddings: EmbeddingGenerator,
    vector_db: VectorDB,
    db: Database,
    upload_cost: i64,
}

impl DocumentIngestor {
    pub fn new(embeddings: EmbeddingGenerator, vector_db: VectorDB, db: Database) -> Self {
        Self {
            embeddings,
            vector_db,
            db,
            upload_cost: UPLOAD_COST,
        }
    }

    pub fn with_upload_cost(mut self, cost: i64) -> Self {
        self.upload_cost = cost;
        self
    }

    pub fn upload_cost(&self) -> i64 {
        self.upload_cost
    }

    /// Validates, charges, splits, embeds and stores one file. The upload cost
    /// is taken before any work starts and given back if indexing fails.
    pub async fn ingest(
        &self,
        session: &mut SessionState,
        file_name: &str,
        bytes: Vec<u8>,
        kind: FileKind,
    ) -> Result<IngestReport, IngestError> {
        validation::validate_document(kind, &bytes)?;

        let email = session.email().to_string();
        let balance = match self.db.debit_coins(&email, self.upload_cost).await {
            Ok(balance) => balance,
            Err(DatabaseError::InsufficientBalance { available, required }) => {
                session.set_balance(available);
                return Err(IngestError::InsufficientBalance { available, required });
            }
            Err(e) => return Err(e.into()),
        };
        session.set_balance(balance);

        let indexed = self.index(session.namespace(), file_name, bytes, kind).await;
        match indexed {
            Ok((chunks, texts)) => Ok(IngestReport {
                file_name: file_name.to_string(),
                file_type: kind,
                chunks,
                preview: texts
                    .iter()
                    .take(PREVIEW_CHUNKS)
                    .map(|t| preview(t, PREVIEW_CHARS))
                    .collect(),
                balance,
            }),
            Err(err) => {
                log::warn!("Indexing {} failed, refunding {} coins: {}", file_name, self.upload_cost, err);
                let refunded = self.db.credit_coins(&email, self.upload_cost).await?;
                session.set_balance(refunded);
                Err(err)
            }
        }
    }

    /// Loads, splits, embeds and upserts; returns the stored count and chunk texts.
    /// A failed upsert removes whatever part of the file already landed.
    async fn index(
        &self,
        namespace: &Namespace,
        file_name: &str,
        bytes: Vec<u8>,
        kind: FileKind,
    ) -> Result<(usize, Vec<String>), IngestError> {
        let owned_name = file_name.to_string();
        let documents = tokio::task::spawn_blocking(move || loader::load(kind, &owned_name, &bytes))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))??;

        let splitter = TextSplitter::for_kind(kind);
        let mut texts = Vec::new();
        let mut metadatas = Vec::new();
        for document in documents {
            for piece in splitter.split_text(&document.text) {
                let mut metadata = document.metadata.clone();
                metadata.insert("source".to_string(), json!(file_name));
                metadata.insert("original_source".to_string(), json!(file_name));
                metadata.insert("file_type".to_string(), json!(kind.as_str()));
                metadata.insert("source_text".to_string(), json!(piece));
                texts.push(piece);
                metadatas.push(metadata);
            }
        }

        if texts.is_empty() {
            return Err(IngestError::NoContent(file_name.to_string()));
        }

        log::info!("Embedding {} chunks of {} for {}", texts.len(), file_name, namespace);
        let vectors = self.embeddings.embed(&texts).await?;

        let records: Vec<VectorRecord> = vectors
            .into_iter()
            .zip(metadatas)
            .map(|(vector, metadata)| VectorRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                metadata,
            })
            .collect();
        let ids: Vec<String> = records.iter().map(|record| record.id.clone()).collect();

        match self.vector_db.upsert(namespace, records).await {
            Ok(chunks) => Ok((chunks, texts)),
            Err(err) => {
                if let Err(cleanup) = self.vector_db.delete(namespace, &ids).await {
                    log::error!("Could not remove partial upload of {}: {}", file_name, cleanup);
                }
                Err(err.into())
            }
        }
    }

    /// The namespace's chunks grouped by the file they came from.
    pub async fn list_documents(&self, namespace: &Namespace) -> Result<Vec<DocumentSummary>, IngestError> {
        let records = self.vector_db.list(namespace, LIST_LIMIT).await?;

        let mut grouped: BTreeMap<String, DocumentSummary> = BTreeMap::new();
        for record in records {
            let metadata = ChunkMetadata::from_metadata(&record.metadata);
            let source = metadata
                .original_source
                .clone()
                .unwrap_or_else(|| UNKNOWN_DOCUMENT.to_string());

            let summary = grouped.entry(source.clone()).or_insert_with(|| DocumentSummary {
                source,
                chunks: 0,
                file_type: metadata.file_type.clone(),
                preview: preview(metadata.text(), LIST_PREVIEW_CHARS),
            });
            summary.chunks += 1;
        }

        Ok(grouped.into_values().collect())
    }

    /// Removes every chunk of `source` from the namespace.
    pub async fn delete_document(&self, namespace: &Namespace, source: &str) -> Result<usize, IngestError> {
        let records = self.vector_db.list(namespace, LIST_LIMIT).await?;

        let ids: Vec<String> = records
            .into_iter()
            .filter(|record| {
                let original = ChunkMetadata::from_metadata(&record.metadata).original_source;
                original.as_deref().unwrap_or(UNKNOWN_DOCUMENT) == source
            })
            .map(|record| record.id)
            .collect();

        if ids.is_empty() {
            return Err(IngestError::NotFound(source.to_string()));
        }

        let deleted = self.vector_db.delete(namespace, &ids).await?;
        log::info!("Deleted document {} ({} chunks) from {}", source, deleted, namespace);
        Ok(deleted)
    }
}
