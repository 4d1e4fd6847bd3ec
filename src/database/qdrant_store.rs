use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, vectors_config::Config, with_payload_selector::SelectorOptions, Condition,
        CreateCollection, CreateFieldIndexCollection, DeletePoints, Distance, FieldType, Filter, PointId,
        PointStruct, ScrollPoints, SearchPoints, UpsertPoints, Value, VectorParams, VectorsConfig,
        WithPayloadSelector,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::qdrant_config::create_qdrant_client;
use super::vector_db::{Metadata, Namespace, VectorBackend, VectorDBError, VectorMatch, VectorRecord, NAMESPACE_FIELD};

const SCROLL_PAGE_SIZE: u32 = 256;

/// Qdrant collection shared by all users; the `namespace` payload field
/// partitions it and every read or delete filters on it.
#[derive(Clone)]
pub struct QdrantBackend {
    client: Arc<Qdrant>,
    collection: String,
}

impl QdrantBackend {
    pub async fn connect(
        url: &str,
        api_key: Option<&str>,
        collection: &str,
        vector_size: u64,
    ) -> Result<Self, VectorDBError> {
        let client = create_qdrant_client(url, api_key).await?;
        let backend = Self {
            client: Arc::new(client),
            collection: collection.to_string(),
        };
        backend.ensure_collection(vector_size).await?;
        Ok(backend)
    }

    async fn ensure_collection(&self, vector_size: u64) -> Result<(), VectorDBError> {
        let exists = self
            .client
            .collection_exists(self.collection.as_str())
            .await
            .map_err(|e| VectorDBError::Connection(e.to_string()))?;
        if exists {
            log::info!("Collection {} already exists, skipping creation", self.collection);
            return Ok(());
        }

        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: vector_size,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };

        let create_collection = CreateCollection {
            collection_name: self.collection.clone(),
            vectors_config: Some(vectors_config),
            ..Default::default()
        };

        match self.client.create_collection(create_collection).await {
            Ok(_) => {}
            Err(e) if e.to_string().contains("already exists") => {
                log::info!("Collection {} already exists, skipping creation", self.collection);
                return Ok(());
            }
            Err(e) => return Err(VectorDBError::Operation(e.to_string())),
        }

        self.client
            .create_field_index(CreateFieldIndexCollection {
                collection_name: self.collection.clone(),
                wait: Some(true),
                field_name: NAMESPACE_FIELD.to_string(),
                field_type: Some(FieldType::Keyword.into()),
                ..Default::default()
            })
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        log::info!("Created collection {} ({} dimensions)", self.collection, vector_size);
        Ok(())
    }
}

fn namespace_filter(namespace: &Namespace) -> Filter {
    Filter::must([Condition::matches(NAMESPACE_FIELD, namespace.as_str().to_string())])
}

fn point_id_to_string(id: Option<PointId>) -> String {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

fn payload_to_metadata(payload: HashMap<String, Value>) -> Metadata {
    payload
        .into_iter()
        .filter(|(key, _)| key != NAMESPACE_FIELD)
        .map(|(key, value)| (key, value.into_json()))
        .collect()
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn upsert_batch(&self, namespace: &Namespace, records: Vec<VectorRecord>) -> Result<(), VectorDBError> {
        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|record| {
                let mut payload = record.metadata;
                payload.insert(NAMESPACE_FIELD.to_string(), namespace.as_str().into());
                PointStruct::new(record.id, record.vector, payload)
            })
            .collect();

        let upsert_points = UpsertPoints {
            collection_name: self.collection.clone(),
            wait: Some(true),
            points,
            ..Default::default()
        };

        self.client
            .upsert_points(upsert_points)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &Namespace,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>, VectorDBError> {
        let request = SearchPoints {
            collection_name: self.collection.clone(),
            vector: vector.to_vec(),
            filter: Some(namespace_filter(namespace)),
            limit: top_k as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(include_metadata)),
            }),
            ..Default::default()
        };

        let results = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| VectorMatch {
                id: point_id_to_string(point.id),
                score: point.score,
                metadata: payload_to_metadata(point.payload),
            })
            .collect())
    }

    async fn delete_batch(&self, namespace: &Namespace, ids: &[String]) -> Result<(), VectorDBError> {
        // Scoped by namespace as well, so foreign ids are never touched.
        let filter = Filter::must([
            namespace_filter(namespace).into(),
            Condition::has_id(ids.iter().cloned().map(PointId::from)),
        ]);

        let delete_points = DeletePoints {
            collection_name: self.collection.clone(),
            wait: Some(true),
            points: Some(filter.into()),
            ..Default::default()
        };

        self.client
            .delete_points(delete_points)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, namespace: &Namespace, limit: usize) -> Result<Vec<VectorMatch>, VectorDBError> {
        let mut matches = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let page_size = SCROLL_PAGE_SIZE.min((limit - matches.len()) as u32);
            let request = ScrollPoints {
                collection_name: self.collection.clone(),
                filter: Some(namespace_filter(namespace)),
                offset: offset.take(),
                limit: Some(page_size),
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            };

            let response = self
                .client
                .scroll(request)
                .await
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;

            matches.extend(response.result.into_iter().map(|point| VectorMatch {
                id: point_id_to_string(point.id),
                score: 0.0,
                metadata: payload_to_metadata(point.payload),
            }));

            match response.next_page_offset {
                Some(next) if matches.len() < limit => offset = Some(next),
                _ => break,
            }
        }

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_ids_render_as_strings() {
        assert_eq!(point_id_to_string(Some(PointId::from(7u64))), "7");
        assert_eq!(
            point_id_to_string(Some(PointId::from("3f2b8a52-52b3-4a2c-9f1e-3c1d2a7b8e90".to_string()))),
            "3f2b8a52-52b3-4a2c-9f1e-3c1d2a7b8e90"
        );
        assert_eq!(point_id_to_string(None), "");
    }

    #[test]
    fn test_namespace_is_stripped_from_metadata() {
        let mut payload = HashMap::new();
        payload.insert(NAMESPACE_FIELD.to_string(), Value::from(json!("alice")));
        payload.insert("source".to_string(), Value::from(json!("report.pdf")));

        let metadata = payload_to_metadata(payload);

        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata["source"], json!("report.pdf"));
    }
}
