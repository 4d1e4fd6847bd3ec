use serde::Serialize;
use thiserror::Error;

use crate::config::RagConfig;
use crate::llm::chat::{ChatManager, ChatMessage};
use crate::llm::semantic_search::{RetrievedChunk, SearchError, SemanticSearch};
use crate::providers::traits::ProviderError;
use crate::session::SessionState;

pub const DEFAULT_TOP_K: usize = 12;
pub const HISTORY_WINDOW: usize = 8;
pub const CHAT_MODEL: &str = "mistral-large-latest";
pub const NO_CONTEXT_SENTINEL: &str = "No relevant context found.";

pub const SYSTEM_PROMPT: &str = "You are Cognit, an assistant that helps users understand the documents they uploaded. \
Answer clearly and in the language of the question. Base every answer on the document excerpts you are given \
and mention the source of the information when it is useful.";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("Chat completion failed: {0}")]
    Chat(#[from] ProviderError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub chunks: Vec<RetrievedChunk>,
    pub fallback: bool,
    pub dropped_chunks: usize,
}

/// Context text handed to the model plus how many chunks it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    pub used: usize,
}

/// Renders chunks (already sorted) into the context block. With `max_chars`
/// set, whole trailing chunks are dropped until it fits, but the first chunk
/// always stays.
pub fn assemble_context(chunks: &[RetrievedChunk], max_chars: Option<usize>) -> AssembledContext {
    if chunks.is_empty() {
        return AssembledContext {
            text: NO_CONTEXT_SENTINEL.to_string(),
            used: 0,
        };
    }

    let mut text = String::new();
    let mut used = 0;
    for (i, chunk) in chunks.iter().enumerate() {
        let entry = format!("Chunk {} (Source: {}):\n{}", i + 1, chunk.source, chunk.source_text);
        let separator = if used == 0 { 0 } else { 2 };

        if let Some(limit) = max_chars {
            if used > 0 && text.len() + separator + entry.len() > limit {
                break;
            }
        }

        if used > 0 {
            text.push_str("\n\n");
        }
        text.push_str(&entry);
        used += 1;
    }

    AssembledContext { text, used }
}

pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "Answer the user's question using only the information inside the context below. \
If the context does not contain enough information to answer, say that you could not find \
sufficient information in the uploaded documents.\n\n\
<context>\n{}\n</context>\n\n\
Question: {}",
        context, query
    )
}

pub fn build_messages(history: &[ChatMessage], window: usize, prompt: String) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(window);
    let mut messages = Vec::with_capacity(history.len() - start + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend_from_slice(&history[start..]);
    messages.push(ChatMessage::user(prompt));
    messages
}

/// Retrieval-augmented chat over the caller's own documents.
#[derive(Clone)]
pub struct RagPipeline {
    search: SemanticSearch,
    chat: ChatManager,
    model: String,
    temperature: f32,
    top_k: usize,
    history_window: usize,
    max_context_chars: Option<usize>,
}

impl RagPipeline {
    pub fn new(search: SemanticSearch, chat: ChatManager) -> Self {
        Self {
            search,
            chat,
            model: CHAT_MODEL.to_string(),
            temperature: 0.0,
            top_k: DEFAULT_TOP_K,
            history_window: HISTORY_WINDOW,
            max_context_chars: None,
        }
    }

    pub fn with_config(mut self, config: &RagConfig, model: &str, temperature: f32) -> Self {
        self.top_k = config.top_k;
        self.history_window = config.history_window;
        self.max_context_chars = config.max_context_chars;
        self.model = model.to_string();
        self.temperature = temperature;
        self
    }

    pub fn search(&self) -> &SemanticSearch {
        &self.search
    }

    /// Answers `query` from the session's namespace. The session history only
    /// grows when an answer (real or fallback) is produced.
    pub async fn ask(&self, session: &mut SessionState, query: &str) -> Result<RagAnswer, PipelineError> {
        let mut chunks = self.search.search(session.namespace(), query, self.top_k).await?;

        let context = assemble_context(&chunks, self.max_context_chars);
        let dropped_chunks = chunks.len() - context.used;
        if dropped_chunks > 0 {
            log::warn!(
                "Context limited to {} characters, dropped {} of {} chunks",
                self.max_context_chars.unwrap_or_default(),
                dropped_chunks,
                chunks.len()
            );
            chunks.truncate(context.used);
        }

        let prompt = build_prompt(&context.text, query);
        let messages = build_messages(session.history(), self.history_window, prompt);

        let outcome = self.chat.complete(&self.model, self.temperature, messages).await?;
        log::info!(
            "Answered with {} chunks after {} attempt(s){}",
            chunks.len(),
            outcome.attempts,
            if outcome.is_fallback() { " (fallback)" } else { "" }
        );

        session.record_turn(query, outcome.text.clone());

        Ok(RagAnswer {
            fallback: outcome.is_fallback(),
            answer: outcome.text,
            chunks,
            dropped_chunks,
        })
    }
}
