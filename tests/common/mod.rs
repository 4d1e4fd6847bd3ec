#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cognit_assistant::app::{Collaborators, Services};
use cognit_assistant::auth::{AuthenticatedSession, DatabaseIdentity, Registration};
use cognit_assistant::config::{
    AppConfig, CostConfig, IdentityKind, ProviderConfig, RagConfig, RetryConfig, VectorBackendKind,
};
use cognit_assistant::converters::{ConvertError, OcrEngine, PageRenderer};
use cognit_assistant::database::{Database, InMemoryBackend};
use cognit_assistant::providers::traits::{
    CompletionProvider, CompletionRequest, EmbeddingProvider, ProviderError, Transcriber,
};

pub const DIMENSION: usize = 16;

/// Bag-of-words vectors: texts sharing words end up close to each other.
pub struct WordEmbeddings;

fn bucket(word: &str) -> usize {
    word.bytes().fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize)) % (DIMENSION - 1)
}

#[async_trait]
impl EmbeddingProvider for WordEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; DIMENSION];
                vector[DIMENSION - 1] = 0.1;
                for word in text.split_whitespace() {
                    let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
                    if !word.is_empty() {
                        vector[bucket(&word)] += 1.0;
                    }
                }
                vector
            })
            .collect())
    }
}

pub enum Reply {
    Answer(String),
    RateLimit,
    Fail,
}

/// Completion provider that replays a script and records every request.
/// Once the script runs out it answers "answer N".
#[derive(Default)]
pub struct ScriptedChat {
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedChat {
    pub fn new(script: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedChat {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let calls = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        match self.script.lock().unwrap().pop_front() {
            Some(Reply::Answer(text)) => Ok(text),
            Some(Reply::RateLimit) => Err(ProviderError::RateLimited("429 Too Many Requests".to_string())),
            Some(Reply::Fail) => Err(ProviderError::Api {
                status: 500,
                body: "upstream exploded".to_string(),
            }),
            None => Ok(format!("answer {}", calls)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct FixedTranscriber;

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _file_name: &str, _audio: Vec<u8>) -> Result<String, ProviderError> {
        Ok("we agreed to ship the release on friday".to_string())
    }
}

/// OCR engine returning canned text, counting calls.
#[derive(Default)]
pub struct FixedOcr {
    pub text: String,
    pub calls: Mutex<usize>,
}

#[async_trait]
impl OcrEngine for FixedOcr {
    async fn recognize(&self, _image: Vec<u8>) -> Result<String, ConvertError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.text.clone())
    }
}

/// Renders every PDF as one blank page.
pub struct BlankPages;

#[async_trait]
impl PageRenderer for BlankPages {
    async fn render_pages(&self, _pdf: Vec<u8>) -> Result<Vec<Vec<u8>>, ConvertError> {
        Ok(vec![sample_png()])
    }
}

pub fn test_config() -> AppConfig {
    let provider = |model: &str, temperature: f32| ProviderConfig {
        api_key: "test-key".to_string(),
        api_url: "http://localhost:9".to_string(),
        chat_model: model.to_string(),
        temperature,
    };

    AppConfig {
        mistral: provider("mistral-large-latest", 0.0),
        openai: provider("gpt-4", 0.7),
        rag: RagConfig {
            top_k: 12,
            history_window: 8,
            max_context_chars: None,
            embedding_model: "mistral-embed".to_string(),
            embedding_dimension: DIMENSION,
        },
        retry: RetryConfig {
            max_retries: 3,
            delay: Duration::ZERO,
        },
        costs: CostConfig {
            upload: 50,
            ocr: 30,
            starting_coins: 100,
        },
        vector_backend: VectorBackendKind::Memory,
        qdrant_url: "http://localhost:6334".to_string(),
        qdrant_api_key: None,
        qdrant_collection: "documents".to_string(),
        database_path: ":memory:".to_string(),
        secret_key: "integration-secret".to_string(),
        token_ttl: Duration::from_secs(2 * 60 * 60),
        password_rounds: 1_000,
        identity: IdentityKind::Database,
        firebase_project_id: None,
        firebase_access_token: None,
        tesseract_cmd: "tesseract".to_string(),
        tesseract_lang: "eng".to_string(),
        pdftoppm_cmd: "pdftoppm".to_string(),
    }
}

/// Services wired to in-process fakes, plus handles to inspect them.
pub struct TestApp {
    pub services: Services,
    pub db: Database,
    pub vectors: Arc<InMemoryBackend>,
    pub rag_chat: Arc<ScriptedChat>,
    pub assistant_chat: Arc<ScriptedChat>,
    pub ocr: Arc<FixedOcr>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let db = Database::in_memory().await.unwrap();
        let vectors = Arc::new(InMemoryBackend::new());
        let rag_chat = ScriptedChat::new(Vec::new());
        let assistant_chat = ScriptedChat::new(Vec::new());
        let ocr = Arc::new(FixedOcr {
            text: "  Invoice   total:\n 42 euros  ".to_string(),
            ..Default::default()
        });

        let services = Services::assemble(
            &config,
            Collaborators {
                db: db.clone(),
                vector_backend: vectors.clone(),
                identity: Arc::new(DatabaseIdentity::new(db.clone())),
                rag_completion: rag_chat.clone(),
                assistant_completion: assistant_chat.clone(),
                embeddings: Arc::new(WordEmbeddings),
                transcriber: Arc::new(FixedTranscriber),
                ocr: ocr.clone(),
                page_renderer: Arc::new(BlankPages),
            },
        );

        Self {
            services,
            db,
            vectors,
            rag_chat,
            assistant_chat,
            ocr,
        }
    }

    pub async fn register(&self, username: &str) -> AuthenticatedSession {
        self.services
            .auth
            .register(Registration {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password: "correct horse".to_string(),
                phone: "+351900000000".to_string(),
            })
            .await
            .unwrap()
    }
}

/// A small valid PNG with dark text-like stripes on white.
pub fn sample_png() -> Vec<u8> {
    use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma};
    use std::io::Cursor;

    let image = GrayImage::from_fn(32, 32, |_, y| if y % 8 < 2 { Luma([20u8]) } else { Luma([235u8]) });
    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
        .unwrap();
    png
}
