use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::providers::traits::{CompletionProvider, CompletionRequest, EmbeddingProvider, ProviderError};
use crate::providers::utils::{check_response, extract_chat_content};

/// Mistral chat and embedding endpoints over plain REST.
#[derive(Clone)]
pub struct MistralProvider {
    api_key: String,
    api_url: String,
    embedding_model: String,
    client: Client,
}

impl MistralProvider {
    pub fn new(config: &ProviderConfig, embedding_model: &str) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            embedding_model: embedding_model.to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl CompletionProvider for MistralProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&json!({
                "model": request.model,
                "messages": request.messages,
                "temperature": request.temperature,
            }))
            .send()
            .await?;

        let response = check_response(response).await?;
        let response_json: Value = response.json().await?;
        extract_chat_content(&response_json)
    }

    fn name(&self) -> &str {
        "mistral"
    }
}

#[async_trait]
impl EmbeddingProvider for MistralProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&json!({
                "model": self.embedding_model,
                "input": texts,
            }))
            .send()
            .await?;

        let response = check_response(response).await?;
        let response_json: Value = response.json().await?;
        parse_embeddings(&response_json)
    }
}

fn parse_embeddings(response_json: &Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = response_json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse("missing `data` array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| ProviderError::InvalidResponse(format!("missing embedding at {}", position)))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| ProviderError::InvalidResponse("non-numeric embedding value".to_string()))
            })
            .collect::<Result<Vec<f32>, _>>()?;
        indexed.push((index, embedding));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, embedding)| embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeddings_follow_index_order() {
        let body = json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vectors = parse_embeddings(&body).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn test_embeddings_reject_malformed_body() {
        assert!(parse_embeddings(&json!({"object": "list"})).is_err());
        assert!(parse_embeddings(&json!({"data": [{"index": 0, "embedding": ["x"]}]})).is_err());
    }
}
