use anyhow::{Context, Result};
use std::sync::Arc;

use crate::auth::password::PasswordHasherConfig;
use crate::auth::{AuthService, DatabaseIdentity, FirebaseIdentity, IdentityProvider, TokenService};
use crate::config::{AppConfig, IdentityKind, VectorBackendKind};
use crate::converters::{AudioSummarizer, ImageToText, OcrEngine, PageRenderer, PdfChat, Pdftoppm};
use crate::database::vector_db::VectorBackend;
use crate::database::{Database, InMemoryBackend, QdrantBackend, VectorDB};
use crate::document::DocumentIngestor;
use crate::llm::{ChatManager, EmbeddingGenerator, RagPipeline, RetryPolicy, SemanticSearch};
use crate::providers::traits::{CompletionProvider, EmbeddingProvider, Transcriber};
use crate::providers::{MistralProvider, OpenAIProvider};
use crate::session::SessionRegistry;

/// External collaborators the services are built on.
pub struct Collaborators {
    pub db: Database,
    pub vector_backend: Arc<dyn VectorBackend>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Answers retrieval questions.
    pub rag_completion: Arc<dyn CompletionProvider>,
    /// Refines OCR output, summarises transcripts and chats about PDFs.
    pub assistant_completion: Arc<dyn CompletionProvider>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub transcriber: Arc<dyn Transcriber>,
    pub ocr: Arc<dyn OcrEngine>,
    pub page_renderer: Arc<dyn PageRenderer>,
}

/// Every service of the application, shared by the REPL and the HTTP API.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<AuthService>,
    pub rag: RagPipeline,
    pub ingestor: DocumentIngestor,
    pub image_to_text: ImageToText,
    pub audio: AudioSummarizer,
    pub pdf_chat: PdfChat,
}

impl Services {
    /// Wires the services together around already-built collaborators.
    pub fn assemble(config: &AppConfig, parts: Collaborators) -> Self {
        let policy = RetryPolicy::from(&config.retry);
        let rag_chat = ChatManager::new(parts.rag_completion, policy.clone());
        let assistant_chat = ChatManager::new(parts.assistant_completion, policy);

        let embeddings = EmbeddingGenerator::new(parts.embeddings, config.rag.embedding_dimension);
        let vector_db = VectorDB::new(parts.vector_backend, config.rag.embedding_dimension);

        let search = SemanticSearch::new(embeddings.clone(), vector_db.clone());
        let rag = RagPipeline::new(search, rag_chat).with_config(
            &config.rag,
            &config.mistral.chat_model,
            config.mistral.temperature,
        );

        let ingestor = DocumentIngestor::new(embeddings, vector_db, parts.db.clone())
            .with_upload_cost(config.costs.upload);

        let image_to_text = ImageToText::new(parts.ocr.clone(), assistant_chat.clone(), parts.db.clone())
            .with_model(&config.openai.chat_model)
            .with_cost(config.costs.ocr);
        let audio = AudioSummarizer::new(parts.transcriber, assistant_chat.clone())
            .with_model(&config.openai.chat_model);
        let pdf_chat = PdfChat::new(assistant_chat)
            .with_model(&config.openai.chat_model)
            .with_scan_fallback(parts.page_renderer, parts.ocr);

        let auth = AuthService::new(
            parts.db,
            parts.identity,
            PasswordHasherConfig::new(config.password_rounds),
            TokenService::new(&config.secret_key, config.token_ttl),
            SessionRegistry::new(),
        )
        .with_starting_coins(config.costs.starting_coins);

        Self {
            auth: Arc::new(auth),
            rag,
            ingestor,
            image_to_text,
            audio,
            pdf_chat,
        }
    }

    /// Connects to every configured backend and builds the services.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let db = Database::new(&config.database_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.database_path))?;

        let vector_backend: Arc<dyn VectorBackend> = match config.vector_backend {
            VectorBackendKind::Qdrant => Arc::new(
                QdrantBackend::connect(
                    &config.qdrant_url,
                    config.qdrant_api_key.as_deref(),
                    &config.qdrant_collection,
                    config.rag.embedding_dimension as u64,
                )
                .await
                .context("Failed to connect to Qdrant")?,
            ),
            VectorBackendKind::Memory => {
                log::warn!("Using the in-memory vector store, documents are lost on exit");
                Arc::new(InMemoryBackend::new())
            }
        };

        let identity: Arc<dyn IdentityProvider> = match config.identity {
            IdentityKind::Database => Arc::new(DatabaseIdentity::new(db.clone())),
            IdentityKind::Firebase => Arc::new(FirebaseIdentity::new(
                config.firebase_project_id.as_deref().unwrap_or_default(),
                config.firebase_access_token.as_deref().unwrap_or_default(),
            )),
        };

        if config.openai.api_key.is_empty() {
            log::warn!("OPENAI_API_KEY is not set, OCR, audio and PDF chat will fail");
        }

        let mistral = Arc::new(MistralProvider::new(&config.mistral, &config.rag.embedding_model));
        let openai = Arc::new(OpenAIProvider::new(&config.openai));

        log::info!(
            "Services ready (vector store: {:?}, identity: {:?})",
            config.vector_backend,
            config.identity
        );

        Ok(Self::assemble(
            config,
            Collaborators {
                db,
                vector_backend,
                identity,
                rag_completion: mistral.clone(),
                assistant_completion: openai.clone(),
                embeddings: mistral,
                transcriber: openai,
                ocr: ocr_engine(config),
                page_renderer: Arc::new(Pdftoppm::new(&config.pdftoppm_cmd)),
            },
        ))
    }
}

#[cfg(not(feature = "native-ocr"))]
fn ocr_engine(config: &AppConfig) -> Arc<dyn OcrEngine> {
    Arc::new(crate::converters::TesseractCli::new(&config.tesseract_cmd, &config.tesseract_lang))
}

#[cfg(feature = "native-ocr")]
fn ocr_engine(config: &AppConfig) -> Arc<dyn OcrEngine> {
    log::debug!("Using linked libtesseract instead of {}", config.tesseract_cmd);
    Arc::new(crate::converters::ocr::native::NativeTesseract::new(&config.tesseract_lang))
}
