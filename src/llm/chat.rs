use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::providers::traits::{CompletionProvider, CompletionRequest, ProviderError};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const FALLBACK_RESPONSE: &str =
    "The assistant is receiving too many requests right now. Please wait a moment and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Where a single completion call stands. Starts at `Attempting(1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Succeeded,
    ExhaustedRetries,
}

impl RetryState {
    /// Transition taken when the provider answers with a rate limit.
    pub fn after_rate_limit(self, max_retries: u32) -> RetryState {
        match self {
            RetryState::Attempting(n) if n < max_retries => RetryState::Attempting(n + 1),
            RetryState::Attempting(_) => RetryState::ExhaustedRetries,
            done => done,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub fallback: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
            fallback: FALLBACK_RESPONSE.to_string(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.delay,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub text: String,
    pub state: RetryState,
    pub attempts: u32,
}

impl ChatOutcome {
    pub fn is_fallback(&self) -> bool {
        self.state == RetryState::ExhaustedRetries
    }
}

/// Sends role-tagged messages to a completion provider, retrying on rate limits
/// with a fixed delay and answering with a fallback once the retries run out.
#[derive(Clone)]
pub struct ChatManager {
    provider: Arc<dyn CompletionProvider>,
    policy: RetryPolicy,
}

impl ChatManager {
    pub fn new(provider: Arc<dyn CompletionProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn complete(
        &self,
        model: &str,
        temperature: f32,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatOutcome, ProviderError> {
        let request = CompletionRequest {
            model: model.to_string(),
            temperature,
            messages,
        };

        let mut state = RetryState::Attempting(1);
        let mut attempts = 0;

        while let RetryState::Attempting(attempt) = state {
            attempts = attempt;
            match self.provider.complete(&request).await {
                Ok(text) => {
                    log::debug!("{} answered on attempt {}", self.provider.name(), attempt);
                    return Ok(ChatOutcome {
                        text,
                        state: RetryState::Succeeded,
                        attempts,
                    });
                }
                Err(ProviderError::RateLimited(detail)) => {
                    state = state.after_rate_limit(self.policy.max_retries);
                    if let RetryState::Attempting(next) = state {
                        log::warn!(
                            "Rate limited by {} ({}), retrying in {:?} (attempt {}/{})",
                            self.provider.name(),
                            detail,
                            self.policy.delay,
                            next,
                            self.policy.max_retries
                        );
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        log::error!(
            "Rate limit persisted after {} attempts against {}, answering with fallback",
            attempts,
            self.provider.name()
        );
        Ok(ChatOutcome {
            text: self.policy.fallback.clone(),
            state: RetryState::ExhaustedRetries,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Scripted {
        Answer(&'static str),
        RateLimit,
        Fail,
    }

    struct ScriptedProvider {
        script: Mutex<VecDeque<Scripted>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Answer(text)) => Ok(text.to_string()),
                Some(Scripted::RateLimit) => Err(ProviderError::RateLimited("429".to_string())),
                Some(Scripted::Fail) | None => Err(ProviderError::Api {
                    status: 500,
                    body: "internal".to_string(),
                }),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn manager(provider: Arc<ScriptedProvider>) -> ChatManager {
        ChatManager::new(
            provider,
            RetryPolicy {
                delay: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(RetryState::Attempting(1).after_rate_limit(3), RetryState::Attempting(2));
        assert_eq!(RetryState::Attempting(3).after_rate_limit(3), RetryState::ExhaustedRetries);
        assert_eq!(RetryState::Succeeded.after_rate_limit(3), RetryState::Succeeded);
    }

    #[tokio::test]
    async fn test_answer_after_two_rate_limits() {
        let provider = ScriptedProvider::new(vec![
            Scripted::RateLimit,
            Scripted::RateLimit,
            Scripted::Answer("real answer"),
        ]);
        let outcome = manager(provider.clone())
            .complete("m", 0.0, vec![ChatMessage::user("q")])
            .await
            .unwrap();

        assert_eq!(outcome.text, "real answer");
        assert_eq!(outcome.state, RetryState::Succeeded);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_fallback_after_three_rate_limits() {
        let provider = ScriptedProvider::new(vec![
            Scripted::RateLimit,
            Scripted::RateLimit,
            Scripted::RateLimit,
            Scripted::Answer("too late"),
        ]);
        let outcome = manager(provider.clone())
            .complete("m", 0.0, vec![ChatMessage::user("q")])
            .await
            .unwrap();

        assert!(outcome.is_fallback());
        assert_eq!(outcome.text, FALLBACK_RESPONSE);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let provider = ScriptedProvider::new(vec![Scripted::Fail, Scripted::Answer("unused")]);
        let result = manager(provider.clone())
            .complete("m", 0.0, vec![ChatMessage::user("q")])
            .await;

        assert!(matches!(result, Err(ProviderError::Api { status: 500, .. })));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_waits_fixed_delay() {
        tokio::time::pause();
        let provider = ScriptedProvider::new(vec![Scripted::RateLimit, Scripted::Answer("ok")]);
        let chat = ChatManager::new(provider, RetryPolicy::default());

        let started = tokio::time::Instant::now();
        let outcome = chat.complete("m", 0.0, vec![ChatMessage::user("q")]).await.unwrap();

        assert_eq!(outcome.text, "ok");
        assert!(started.elapsed() >= DEFAULT_RETRY_DELAY);
    }

    #[test]
    fn test_roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
