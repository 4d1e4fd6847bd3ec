use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        AudioInput, ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateTranscriptionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::llm::chat::{ChatMessage, ChatRole};
use crate::providers::traits::{CompletionProvider, CompletionRequest, ProviderError, Transcriber};

const WHISPER_MODEL: &str = "whisper-1";

/// OpenAI chat completions and Whisper transcription.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    transcription_model: String,
}

impl OpenAIProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(config.api_url.clone());

        Self {
            client: Client::with_config(openai_config),
            transcription_model: WHISPER_MODEL.to_string(),
        }
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = message.content.as_str();
    Ok(match message.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

impl From<OpenAIError> for ProviderError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::ApiError(api)
                if api.code.as_deref() == Some("rate_limit_exceeded")
                    || api.r#type.as_deref() == Some("rate_limit_exceeded") =>
            {
                ProviderError::RateLimited(api.message)
            }
            OpenAIError::Reqwest(e) => ProviderError::Http(e),
            OpenAIError::JSONDeserialize(e) => ProviderError::InvalidResponse(e.to_string()),
            other => ProviderError::Other(other.to_string()),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let messages = request
            .messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .temperature(request.temperature)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(chat_request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ProviderError::InvalidResponse("No response content".to_string()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[async_trait]
impl Transcriber for OpenAIProvider {
    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<String, ProviderError> {
        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8(file_name.to_string(), audio))
            .model(&self.transcription_model)
            .build()?;

        let response = self.client.audio().transcribe(request).await?;
        Ok(response.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    #[test]
    fn test_rate_limit_api_error_maps_to_rate_limited() {
        let err = OpenAIError::ApiError(ApiError {
            message: "Rate limit reached".to_string(),
            r#type: Some("requests".to_string()),
            param: None,
            code: Some("rate_limit_exceeded".to_string()),
        });
        assert!(ProviderError::from(err).is_rate_limited());

        let err = OpenAIError::InvalidArgument("model missing".to_string());
        assert!(!ProviderError::from(err).is_rate_limited());
    }

    #[test]
    fn test_messages_convert_for_every_role() {
        for message in [
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ] {
            assert!(to_request_message(&message).is_ok());
        }
    }
}
