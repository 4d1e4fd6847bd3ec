pub mod chat;
pub mod embeddings;
pub mod rag;
pub mod semantic_search;

pub use chat::{ChatManager, ChatMessage, ChatOutcome, RetryPolicy};
pub use embeddings::EmbeddingGenerator;
pub use rag::{RagAnswer, RagPipeline};
pub use semantic_search::{RetrievedChunk, SemanticSearch};
