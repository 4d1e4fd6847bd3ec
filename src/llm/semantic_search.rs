use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use crate::database::vector_db::{Metadata, Namespace, VectorDB, VectorDBError, VectorMatch};
use crate::llm::embeddings::{EmbeddingError, EmbeddingGenerator};

pub const DEFAULT_SOURCE_TEXT: &str = "Text unavailable";
pub const DEFAULT_SOURCE: &str = "Unknown source";

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Failed to search: {0}")]
    VectorStore(#[from] VectorDBError),
}

/// Typed view over the loose metadata stored next to each chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_text: Option<String>,
    pub source: Option<String>,
    pub original_source: Option<String>,
    pub file_type: Option<String>,
    pub page: Option<u64>,
    pub row: Option<u64>,
}

impl ChunkMetadata {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let text = |key: &str| metadata.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let number = |key: &str| metadata.get(key).and_then(|v| v.as_u64());

        Self {
            source_text: text("source_text"),
            source: text("source"),
            original_source: text("original_source"),
            file_type: text("file_type"),
            page: number("page"),
            row: number("row"),
        }
    }

    pub fn text(&self) -> &str {
        self.source_text.as_deref().unwrap_or(DEFAULT_SOURCE_TEXT)
    }

    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or(DEFAULT_SOURCE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub score: f32,
    pub source: String,
    pub source_text: String,
    pub metadata: ChunkMetadata,
}

impl From<VectorMatch> for RetrievedChunk {
    fn from(m: VectorMatch) -> Self {
        let metadata = ChunkMetadata::from_metadata(&m.metadata);
        Self {
            id: m.id,
            score: m.score,
            source: metadata.source().to_string(),
            source_text: metadata.text().to_string(),
            metadata,
        }
    }
}

/// Stable sort by score, highest first. NaN scores go last.
pub fn sort_by_score(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
    });
}

#[derive(Clone)]
pub struct SemanticSearch {
    embeddings: EmbeddingGenerator,
    vector_db: VectorDB,
}

impl SemanticSearch {
    pub fn new(embeddings: EmbeddingGenerator, vector_db: VectorDB) -> Self {
        Self { embeddings, vector_db }
    }

    pub fn embeddings(&self) -> &EmbeddingGenerator {
        &self.embeddings
    }

    pub fn vector_db(&self) -> &VectorDB {
        &self.vector_db
    }

    /// Chunks of `namespace` closest to `query`, best first.
    pub async fn search(&self, namespace: &Namespace, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        let query_embedding = self.embeddings.embed_query(query).await?;
        let matches = self.vector_db.query(namespace, &query_embedding, top_k, true).await?;
        log::debug!("Retrieved {} chunks for namespace {}", matches.len(), namespace);

        let mut chunks: Vec<RetrievedChunk> = matches.into_iter().map(RetrievedChunk::from).collect();
        sort_by_score(&mut chunks);
        Ok(chunks)
    }
}
