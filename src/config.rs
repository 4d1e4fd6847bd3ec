use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

/// Which vector store the application talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorBackendKind {
    Qdrant,
    Memory,
}

/// Which identity provider resolves users to their namespace uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityKind {
    Database,
    Firebase,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_url: String,
    pub chat_model: String,
    pub temperature: f32,
}

impl ProviderConfig {
    pub fn from_env(provider: &str) -> Self {
        let prefix = provider.to_uppercase();

        let api_key = env::var(format!("{}_API_KEY", prefix)).unwrap_or_default();

        let api_url = env::var(format!("{}_API_URL", prefix)).unwrap_or_else(|_| match provider {
            "openai" => "https://api.openai.com/v1".to_string(),
            "mistral" => "https://api.mistral.ai/v1".to_string(),
            _ => String::new(),
        });

        let chat_model = env::var(format!("{}_CHAT_MODEL", prefix)).unwrap_or_else(|_| match provider {
            "openai" => "gpt-4".to_string(),
            "mistral" => "mistral-large-latest".to_string(),
            _ => String::new(),
        });

        // Retrieval answers are deterministic; the generative helpers are not.
        let temperature = env::var(format!("{}_TEMPERATURE", prefix))
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(match provider {
                "mistral" => 0.0,
                _ => 0.7,
            });

        Self {
            api_key,
            api_url,
            chat_model,
            temperature,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub top_k: usize,
    pub history_window: usize,
    pub max_context_chars: Option<usize>,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct CostConfig {
    pub upload: i64,
    pub ocr: i64,
    pub starting_coins: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mistral: ProviderConfig,
    pub openai: ProviderConfig,
    pub rag: RagConfig,
    pub retry: RetryConfig,
    pub costs: CostConfig,
    pub vector_backend: VectorBackendKind,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub qdrant_collection: String,
    pub database_path: String,
    pub secret_key: String,
    pub token_ttl: Duration,
    pub password_rounds: u32,
    pub identity: IdentityKind,
    pub firebase_project_id: Option<String>,
    pub firebase_access_token: Option<String>,
    pub tesseract_cmd: String,
    pub tesseract_lang: String,
    pub pdftoppm_cmd: String,
}

impl AppConfig {
    /// Reads the whole configuration from the process environment.
    /// Call `dotenv::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_key = required("SECRET_KEY")?;

        let mistral = ProviderConfig::from_env("mistral");
        if mistral.api_key.is_empty() {
            return Err(ConfigError::Missing("MISTRAL_API_KEY".to_string()));
        }
        let openai = ProviderConfig::from_env("openai");

        let vector_backend = match env::var("VECTOR_BACKEND").unwrap_or_else(|_| "qdrant".to_string()).as_str() {
            "qdrant" => VectorBackendKind::Qdrant,
            "memory" => VectorBackendKind::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    key: "VECTOR_BACKEND".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let identity = match env::var("IDENTITY_PROVIDER").unwrap_or_else(|_| "database".to_string()).as_str() {
            "database" => IdentityKind::Database,
            "firebase" => IdentityKind::Firebase,
            other => {
                return Err(ConfigError::Invalid {
                    key: "IDENTITY_PROVIDER".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let firebase_project_id = env::var("FIREBASE_PROJECT_ID").ok();
        let firebase_access_token = env::var("FIREBASE_ACCESS_TOKEN").ok();
        if identity == IdentityKind::Firebase {
            if firebase_project_id.is_none() {
                return Err(ConfigError::Missing("FIREBASE_PROJECT_ID".to_string()));
            }
            if firebase_access_token.is_none() {
                return Err(ConfigError::Missing("FIREBASE_ACCESS_TOKEN".to_string()));
            }
        }

        Ok(Self {
            mistral,
            openai,
            rag: RagConfig {
                top_k: parsed("RAG_TOP_K", 12)?,
                history_window: parsed("RAG_HISTORY_WINDOW", 8)?,
                max_context_chars: optional_parsed("RAG_MAX_CONTEXT_CHARS")?,
                embedding_model: env::var("MISTRAL_EMBEDDING_MODEL").unwrap_or_else(|_| "mistral-embed".to_string()),
                embedding_dimension: parsed("EMBEDDING_DIMENSION", 1024)?,
            },
            retry: RetryConfig {
                max_retries: parsed("CHAT_MAX_RETRIES", 3)?,
                delay: Duration::from_secs(parsed("CHAT_RETRY_DELAY_SECS", 5)?),
            },
            costs: CostConfig {
                upload: parsed("UPLOAD_COST", 50)?,
                ocr: parsed("OCR_COST", 30)?,
                starting_coins: parsed("STARTING_COINS", 100)?,
            },
            vector_backend,
            qdrant_url: env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".to_string()),
            qdrant_api_key: env::var("QDRANT_API_KEY").ok(),
            qdrant_collection: env::var("QDRANT_COLLECTION").unwrap_or_else(|_| "documents".to_string()),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "cognit.db".to_string()),
            secret_key,
            token_ttl: Duration::from_secs(parsed("TOKEN_TTL_SECS", 2 * 60 * 60)?),
            password_rounds: parsed("PASSWORD_ROUNDS", 100_000)?,
            identity,
            firebase_project_id,
            firebase_access_token,
            tesseract_cmd: env::var("TESSERACT_CMD").unwrap_or_else(|_| "tesseract".to_string()),
            tesseract_lang: env::var("TESSERACT_LANG").unwrap_or_else(|_| "por+eng".to_string()),
            pdftoppm_cmd: env::var("PDFTOPPM_CMD").unwrap_or_else(|_| "pdftoppm".to_string()),
        })
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key.to_string())),
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(optional_parsed(key)?.unwrap_or(default))
}

fn optional_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value.trim().parse().map(Some).map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_defaults() {
        let config = ProviderConfig::from_env("unconfigured-provider");
        assert!(config.api_key.is_empty());
        assert_eq!(config.temperature, 0.7);
    }

    #[test]
    fn test_optional_parsed_rejects_garbage() {
        env::set_var("COGNIT_TEST_BAD_NUMBER", "twelve");
        let result: Result<Option<usize>, _> = optional_parsed("COGNIT_TEST_BAD_NUMBER");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        env::remove_var("COGNIT_TEST_BAD_NUMBER");
    }

    #[test]
    fn test_parsed_falls_back_to_default() {
        let value: u32 = parsed("COGNIT_TEST_UNSET_VALUE", 3).unwrap();
        assert_eq!(value, 3);
    }
}
