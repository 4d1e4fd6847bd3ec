use reqwest::{Response, StatusCode};
use serde_json::Value;

use crate::providers::traits::ProviderError;

/// Turns a non-success response into a `ProviderError`, keeping HTTP 429
/// distinguishable from every other failure.
pub async fn check_response(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

pub fn status_error(status: StatusCode, body: String) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited(body)
    } else {
        ProviderError::Api {
            status: status.as_u16(),
            body,
        }
    }
}

/// Extracts `choices[0].message.content` from an OpenAI-style chat response.
pub fn extract_chat_content(response_json: &Value) -> Result<String, ProviderError> {
    if let Some(error) = response_json.get("error") {
        return Err(ProviderError::InvalidResponse(format!("API returned error: {}", error)));
    }

    response_json
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            let debug_json = serde_json::to_string_pretty(response_json).unwrap_or_default();
            ProviderError::InvalidResponse(format!("Response JSON: {}", debug_json))
        })
}
