use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::vector_db::{Namespace, VectorBackend, VectorDBError, VectorMatch, VectorRecord};

/// Process-local vector store with cosine similarity, one map per namespace.
#[derive(Default)]
pub struct InMemoryBackend {
    namespaces: RwLock<HashMap<Namespace, Vec<VectorRecord>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, namespace: &Namespace) -> usize {
        self.namespaces.read().get(namespace).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self, namespace: &Namespace) -> bool {
        self.len(namespace) == 0
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn upsert_batch(&self, namespace: &Namespace, records: Vec<VectorRecord>) -> Result<(), VectorDBError> {
        let mut namespaces = self.namespaces.write();
        let stored = namespaces.entry(namespace.clone()).or_default();
        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &Namespace,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>, VectorDBError> {
        let namespaces = self.namespaces.read();
        let Some(stored) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<VectorMatch> = stored
            .iter()
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.vector),
                metadata: if include_metadata {
                    record.metadata.clone()
                } else {
                    Default::default()
                },
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_batch(&self, namespace: &Namespace, ids: &[String]) -> Result<(), VectorDBError> {
        if let Some(stored) = self.namespaces.write().get_mut(namespace) {
            stored.retain(|record| !ids.contains(&record.id));
        }
        Ok(())
    }

    async fn list(&self, namespace: &Namespace, limit: usize) -> Result<Vec<VectorMatch>, VectorDBError> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|stored| {
                stored
                    .iter()
                    .take(limit)
                    .map(|record| VectorMatch {
                        id: record.id.clone(),
                        score: 0.0,
                        metadata: record.metadata.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        let mut metadata = serde_json::Map::new();
        metadata.insert("source_text".to_string(), json!(id));
        VectorRecord {
            id: id.to_string(),
            vector,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let backend = InMemoryBackend::new();
        let alice = Namespace::new("alice").unwrap();
        let bob = Namespace::new("bob").unwrap();

        backend.upsert_batch(&alice, vec![record("a1", vec![1.0, 0.0])]).await.unwrap();
        backend.upsert_batch(&bob, vec![record("b1", vec![1.0, 0.0])]).await.unwrap();

        let hits = backend.query(&alice, &[1.0, 0.0], 10, true).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a1");
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let backend = InMemoryBackend::new();
        let ns = Namespace::new("alice").unwrap();
        backend
            .upsert_batch(
                &ns,
                vec![
                    record("far", vec![0.0, 1.0]),
                    record("near", vec![1.0, 0.1]),
                ],
            )
            .await
            .unwrap();

        let hits = backend.query(&ns, &[1.0, 0.0], 10, false).await.unwrap();
        assert_eq!(hits[0].id, "near");
        assert!(hits[0].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id_and_delete_removes() {
        let backend = InMemoryBackend::new();
        let ns = Namespace::new("alice").unwrap();
        backend.upsert_batch(&ns, vec![record("x", vec![1.0, 0.0])]).await.unwrap();
        backend.upsert_batch(&ns, vec![record("x", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(backend.len(&ns), 1);

        backend.delete_batch(&ns, &["x".to_string()]).await.unwrap();
        assert!(backend.is_empty(&ns));
    }
}
