pub mod ingest;
pub mod loader;
pub mod splitter;
pub mod validation;

pub use ingest::{DocumentIngestor, DocumentSummary, IngestError, IngestReport};
pub use loader::FileKind;
pub use splitter::TextSplitter;
pub use validation::ValidationError;
