use serde::Serialize;
use std::sync::Arc;

use super::ConvertError;
use crate::document::validation;
use crate::llm::chat::{ChatManager, ChatMessage};
use crate::providers::traits::Transcriber;

pub const SUMMARY_MODEL: &str = "gpt-4";
const SUMMARY_TEMPERATURE: f32 = 0.7;
const SUMMARY_SYSTEM_PROMPT: &str = "Summarize the following meeting transcript clearly and objectively.";

#[derive(Debug, Clone, Serialize)]
pub struct AudioSummary {
    pub transcript: String,
    pub summary: String,
}

/// Transcribes a recording and summarises the transcript.
#[derive(Clone)]
pub struct AudioSummarizer {
    transcriber: Arc<dyn Transcriber>,
    chat: ChatManager,
    model: String,
}

impl AudioSummarizer {
    pub fn new(transcriber: Arc<dyn Transcriber>, chat: ChatManager) -> Self {
        Self {
            transcriber,
            chat,
            model: SUMMARY_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub async fn summarize(&self, file_name: &str, bytes: Vec<u8>) -> Result<AudioSummary, ConvertError> {
        let format = validation::validate_audio(file_name, &bytes)?;
        log::info!("Transcribing {} ({:?}, {} bytes)", file_name, format, bytes.len());

        let transcript = self.transcriber.transcribe(file_name, bytes).await?;
        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            return Err(ConvertError::NoText);
        }

        let outcome = self
            .chat
            .complete(
                &self.model,
                SUMMARY_TEMPERATURE,
                vec![
                    ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
                    ChatMessage::user(transcript.clone()),
                ],
            )
            .await?;
        if outcome.is_fallback() {
            return Err(ConvertError::Busy);
        }

        Ok(AudioSummary {
            transcript,
            summary: outcome.text,
        })
    }
}
