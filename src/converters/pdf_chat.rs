use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use super::ocr::OcrEngine;
use super::ConvertError;
use crate::document::{loader, validation};
use crate::llm::chat::{ChatManager, ChatMessage};

pub const PDF_CHAT_MODEL: &str = "gpt-4";
pub const MAX_CHUNK_CHARS: usize = 4000;
const PDF_CHAT_TEMPERATURE: f32 = 0.7;
const ANSWER_SEPARATOR: &str = "\n---\n";
const PDF_SYSTEM_PROMPT: &str = "You are an assistant specialized in PDF processing.";
pub const SCAN_DPI: u32 = 150;

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Renders every page of a PDF to a PNG image, in page order.
    async fn render_pages(&self, pdf: Vec<u8>) -> Result<Vec<Vec<u8>>, ConvertError>;
}

/// Renders pages with poppler's `pdftoppm` inside a scratch directory.
#[derive(Debug, Clone)]
pub struct Pdftoppm {
    command: String,
    dpi: u32,
}

impl Pdftoppm {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            dpi: SCAN_DPI,
        }
    }
}

fn render_error(err: std::io::Error) -> ConvertError {
    ConvertError::Ocr(format!("page rendering failed: {}", err))
}

#[async_trait]
impl PageRenderer for Pdftoppm {
    async fn render_pages(&self, pdf: Vec<u8>) -> Result<Vec<Vec<u8>>, ConvertError> {
        let dir = tempfile::tempdir().map_err(render_error)?;
        let input = dir.path().join("input.pdf");
        tokio::fs::write(&input, &pdf).await.map_err(render_error)?;

        let output = Command::new(&self.command)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(&input)
            .arg(dir.path().join("page"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ConvertError::Ocr(format!("failed to start {}: {}", self.command, e)))?;

        if !output.status.success() {
            return Err(ConvertError::Ocr(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        // pdftoppm zero-pads page numbers, so name order is page order.
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.map_err(render_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(render_error)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut pages = Vec::with_capacity(paths.len());
        for path in paths {
            pages.push(tokio::fs::read(&path).await.map_err(render_error)?);
        }
        Ok(pages)
    }
}

#[derive(Clone)]
struct ScanFallback {
    renderer: Arc<dyn PageRenderer>,
    ocr: Arc<dyn OcrEngine>,
}

/// Groups whitespace-separated words into chunks of at most `max_chars`
/// characters. A single word longer than the limit gets a chunk of its own.
pub fn split_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };

        if needed > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Asks one question about a single PDF without indexing it.
#[derive(Clone)]
pub struct PdfChat {
    chat: ChatManager,
    model: String,
    max_chunk_chars: usize,
    scan: Option<ScanFallback>,
}

impl PdfChat {
    pub fn new(chat: ChatManager) -> Self {
        Self {
            chat,
            model: PDF_CHAT_MODEL.to_string(),
            max_chunk_chars: MAX_CHUNK_CHARS,
            scan: None,
        }
    }

    /// OCRs the rendered pages of PDFs that have no text layer.
    pub fn with_scan_fallback(mut self, renderer: Arc<dyn PageRenderer>, ocr: Arc<dyn OcrEngine>) -> Self {
        self.scan = Some(ScanFallback { renderer, ocr });
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub async fn ask(&self, bytes: Vec<u8>, question: &str) -> Result<String, ConvertError> {
        validation::validate_pdf(&bytes)?;

        let pdf = bytes.clone();
        let text = tokio::task::spawn_blocking(move || loader::pdf_text(&pdf))
            .await
            .map_err(|e| ConvertError::Task(e.to_string()))??;

        let text = self.text_or_scan(text, bytes).await?;
        self.ask_text(&text, question).await
    }

    /// Keeps extracted text; OCRs the pages when there is none.
    async fn text_or_scan(&self, text: String, bytes: Vec<u8>) -> Result<String, ConvertError> {
        if !text.trim().is_empty() {
            return Ok(text);
        }
        let Some(scan) = &self.scan else {
            return Err(ConvertError::NoText);
        };

        let pages = scan.renderer.render_pages(bytes).await?;
        log::info!("PDF has no text layer, running OCR on {} page(s)", pages.len());

        let mut texts = Vec::with_capacity(pages.len());
        for page in pages {
            texts.push(scan.ocr.recognize(page).await?);
        }
        Ok(texts.join("\n").trim().to_string())
    }

    /// Runs the question against every chunk of already extracted text.
    pub async fn ask_text(&self, text: &str, question: &str) -> Result<String, ConvertError> {
        let chunks = split_words(text, self.max_chunk_chars);
        if chunks.is_empty() {
            return Err(ConvertError::NoText);
        }

        log::info!("Asking about a PDF in {} chunk(s)", chunks.len());
        let mut answers = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let outcome = self
                .chat
                .complete(
                    &self.model,
                    PDF_CHAT_TEMPERATURE,
                    vec![
                        ChatMessage::system(PDF_SYSTEM_PROMPT),
                        ChatMessage::user(format!("{}\n\n{}", chunk, question)),
                    ],
                )
                .await?;
            if outcome.is_fallback() {
                return Err(ConvertError::Busy);
            }
            answers.push(outcome.text);
        }

        Ok(answers.join(ANSWER_SEPARATOR))
    }
}
