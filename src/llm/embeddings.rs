use std::sync::Arc;
use thiserror::Error;

use crate::providers::traits::{EmbeddingProvider, ProviderError};

pub const EMBEDDING_DIMENSION: usize = 1024;
const EMBEDDING_BATCH_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Embedding count mismatch: expected {expected}, got {got}")]
    CountMismatch { expected: usize, got: usize },
    #[error("Generated embedding has wrong size: {got} (expected {expected})")]
    Dimension { expected: usize, got: usize },
}

#[derive(Clone)]
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimension: usize) -> Self {
        Self { provider, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embeds every text, preserving order. Empty input makes no provider call.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            let vectors = self.provider.embed_documents(batch).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    got: vectors.len(),
                });
            }
            for vector in &vectors {
                self.check_dimension(vector)?;
            }
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch { expected: 1, got: 0 })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), EmbeddingError> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::Dimension {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CountingProvider {
        dimension: usize,
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; self.dimension];
                    v[0] = t.len() as f32;
                    v
                })
                .collect())
        }
    }

    fn generator(provider_dim: usize) -> (Arc<CountingProvider>, EmbeddingGenerator) {
        let provider = Arc::new(CountingProvider {
            dimension: provider_dim,
            calls: Mutex::new(Vec::new()),
        });
        (provider.clone(), EmbeddingGenerator::new(provider, EMBEDDING_DIMENSION))
    }

    #[tokio::test]
    async fn test_empty_input_skips_provider() {
        let (provider, generator) = generator(EMBEDDING_DIMENSION);
        let vectors = generator.embed(&[]).await.unwrap();
        assert!(vectors.is_empty());
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_preserved_across_batches() {
        let (provider, generator) = generator(EMBEDDING_DIMENSION);
        let texts: Vec<String> = (0..40).map(|i| "x".repeat(i + 1)).collect();

        let vectors = generator.embed(&texts).await.unwrap();

        assert_eq!(vectors.len(), 40);
        assert_eq!(vectors[0][0], 1.0);
        assert_eq!(vectors[39][0], 40.0);
        assert_eq!(*provider.calls.lock().unwrap(), vec![32, 8]);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let (_, generator) = generator(1536);
        let result = generator.embed_query("hello").await;
        assert!(matches!(
            result,
            Err(EmbeddingError::Dimension { expected: 1024, got: 1536 })
        ));
    }
}
