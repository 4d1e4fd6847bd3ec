pub mod database;
pub mod memory_store;
pub mod qdrant_config;
pub mod qdrant_store;
pub mod vector_db;

pub use database::Database;
pub use database::DatabaseError;
pub use memory_store::InMemoryBackend;
pub use qdrant_store::QdrantBackend;
pub use vector_db::{Namespace, VectorDB, VectorDBError};
