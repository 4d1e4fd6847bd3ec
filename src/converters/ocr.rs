use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma};
use serde::Serialize;
use std::io::Cursor;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::ConvertError;
use crate::database::Database;
use crate::document::validation;
use crate::llm::chat::{ChatManager, ChatMessage};
use crate::session::SessionState;

pub const OCR_COST: i64 = 30;
pub const REFINE_MODEL: &str = "gpt-4";
/// Sigma OpenCV derives for a 5x5 Gaussian kernel.
const BLUR_SIGMA: f32 = 1.1;
const UNKNOWN_LANGUAGE: &str = "unknown";

const REFINE_SYSTEM_PROMPT: &str =
    "You are an assistant that improves text extracted by OCR, fixing recognition errors and formatting it correctly.";

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognises text in an encoded (PNG) image.
    async fn recognize(&self, image: Vec<u8>) -> Result<String, ConvertError>;
}

/// Runs the `tesseract` binary with `--oem 3 --psm 6`, piping the image in.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: String,
    language: String,
}

impl TesseractCli {
    pub fn new(command: &str, language: &str) -> Self {
        Self {
            command: command.to_string(),
            language: language.to_string(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: Vec<u8>) -> Result<String, ConvertError> {
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.language, "--oem", "3", "--psm", "6"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConvertError::Ocr(format!("failed to start {}: {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&image)
                .await
                .map_err(|e| ConvertError::Ocr(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ConvertError::Ocr(e.to_string()))?;

        if !output.status.success() {
            return Err(ConvertError::Ocr(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(feature = "native-ocr")]
pub mod native {
    use super::*;
    use tesseract::{OcrEngineMode, PageSegMode, Tesseract};

    /// Links libtesseract instead of spawning a process.
    #[derive(Debug, Clone)]
    pub struct NativeTesseract {
        language: String,
    }

    impl NativeTesseract {
        pub fn new(language: &str) -> Self {
            Self {
                language: language.to_string(),
            }
        }
    }

    #[async_trait]
    impl OcrEngine for NativeTesseract {
        async fn recognize(&self, image: Vec<u8>) -> Result<String, ConvertError> {
            let language = self.language.clone();
            tokio::task::spawn_blocking(move || {
                let mut tess = Tesseract::new_with_oem(None, Some(&language), OcrEngineMode::Default)
                    .map_err(|e| ConvertError::Ocr(e.to_string()))?
                    .set_image_from_mem(&image)
                    .map_err(|e| ConvertError::Ocr(e.to_string()))?;
                tess.set_page_seg_mode(PageSegMode::PsmSingleBlock);
                let mut tess = tess.recognize().map_err(|e| ConvertError::Ocr(e.to_string()))?;
                tess.get_text().map_err(|e| ConvertError::Ocr(e.to_string()))
            })
            .await
            .map_err(|e| ConvertError::Task(e.to_string()))?
        }
    }
}

/// Threshold that maximises between-class variance of the histogram.
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    let weighted_sum: f64 = histogram.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut background_weight = 0u64;
    let mut background_sum = 0f64;
    let mut best_threshold = 0u8;
    let mut best_variance = -1f64;

    for (level, &count) in histogram.iter().enumerate() {
        background_weight += count;
        if background_weight == 0 {
            continue;
        }
        let foreground_weight = total - background_weight;
        if foreground_weight == 0 {
            break;
        }

        background_sum += level as f64 * count as f64;
        let background_mean = background_sum / background_weight as f64;
        let foreground_mean = (weighted_sum - background_sum) / foreground_weight as f64;
        let variance = background_weight as f64
            * foreground_weight as f64
            * (background_mean - foreground_mean).powi(2);

        if variance > best_variance {
            best_variance = variance;
            best_threshold = level as u8;
        }
    }

    best_threshold
}

/// Grayscale, 5x5 Gaussian blur and Otsu binarisation, re-encoded as PNG.
pub fn preprocess(bytes: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let blurred = image::load_from_memory(bytes)?.grayscale().blur(BLUR_SIGMA).to_luma8();

    let threshold = otsu_threshold(&blurred);
    let binary = GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
        if blurred.get_pixel(x, y).0[0] > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    let mut encoded = Vec::new();
    DynamicImage::ImageLuma8(binary).write_to(&mut Cursor::new(&mut encoded), ImageOutputFormat::Png)?;
    Ok(encoded)
}

/// Trims and collapses every whitespace run into one space.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// ISO 639-3 code of the text's language, or "unknown".
pub fn detect_language(text: &str) -> String {
    whatlang::detect(text)
        .map(|info| info.lang().code().to_string())
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    pub raw_text: String,
    pub text: String,
    pub language: String,
    pub balance: i64,
}

/// Image to refined text, charged once the whole conversion succeeded.
#[derive(Clone)]
pub struct ImageToText {
    ocr: Arc<dyn OcrEngine>,
    chat: ChatManager,
    db: Database,
    model: String,
    cost: i64,
}

impl ImageToText {
    pub fn new(ocr: Arc<dyn OcrEngine>, chat: ChatManager, db: Database) -> Self {
        Self {
            ocr,
            chat,
            db,
            model: REFINE_MODEL.to_string(),
            cost: OCR_COST,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_cost(mut self, cost: i64) -> Self {
        self.cost = cost;
        self
    }

    pub async fn convert(&self, session: &mut SessionState, bytes: Vec<u8>) -> Result<OcrResult, ConvertError> {
        validation::validate_image(&bytes)?;

        let email = session.email().to_string();
        let available = self.db.get_coins(&email).await?;
        session.set_balance(available);
        if available < self.cost {
            return Err(ConvertError::InsufficientBalance {
                available,
                required: self.cost,
            });
        }

        let processed = tokio::task::spawn_blocking(move || preprocess(&bytes))
            .await
            .map_err(|e| ConvertError::Task(e.to_string()))??;

        let raw_text = clean_text(&self.ocr.recognize(processed).await?);
        if raw_text.is_empty() {
            return Err(ConvertError::NoText);
        }

        let outcome = self
            .chat
            .complete(
                &self.model,
                0.0,
                vec![
                    ChatMessage::system(REFINE_SYSTEM_PROMPT),
                    ChatMessage::user(format!("Correct and format the following OCR text:\n{}", raw_text)),
                ],
            )
            .await?;
        if outcome.is_fallback() {
            return Err(ConvertError::Busy);
        }

        let language = detect_language(&outcome.text);
        let balance = self.db.debit_coins(&email, self.cost).await?;
        session.set_balance(balance);
        log::info!("Converted image for {} ({} chars, language {})", email, outcome.text.len(), language);

        Ok(OcrResult {
            raw_text,
            text: outcome.text,
            language,
            balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_exiting_early_is_an_error() {
        // `true` exits without reading stdin, so the image write breaks.
        let engine = TesseractCli::new("true", "eng");
        let err = engine.recognize(vec![0u8; 1 << 20]).await.unwrap_err();
        assert!(matches!(err, ConvertError::Ocr(_)));
    }

    #[tokio::test]
    async fn test_missing_engine_binary() {
        let engine = TesseractCli::new("/nonexistent/tesseract", "eng");
        let err = engine.recognize(vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, ConvertError::Ocr(msg) if msg.contains("failed to start")));
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Hello \n\n  world\t!  "), "Hello world !");
        assert_eq!(clean_text(" \n "), "");
    }

    #[test]
    fn test_detect_language() {
        let portuguese = "O relatório anual mostra que a empresa cresceu bastante no último ano e contratou novos funcionários.";
        assert_eq!(detect_language(portuguese), "por");
        assert_eq!(detect_language(""), "unknown");
    }

    #[test]
    fn test_otsu_separates_two_levels() {
        let image = GrayImage::from_fn(10, 10, |x, _| if x < 5 { Luma([40u8]) } else { Luma([210u8]) });
        let threshold = otsu_threshold(&image);
        assert!((40..210).contains(&threshold));
    }

    #[test]
    fn test_preprocess_outputs_binary_png() {
        let source = GrayImage::from_fn(16, 16, |x, _| if x < 8 { Luma([30u8]) } else { Luma([220u8]) });
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(source)
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .unwrap();

        let processed = preprocess(&png).unwrap();
        let decoded = image::load_from_memory(&processed).unwrap().to_luma8();

        assert_eq!(decoded.dimensions(), (16, 16));
        assert!(decoded.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(decoded.get_pixel(0, 0).0[0], 0);
        assert_eq!(decoded.get_pixel(15, 0).0[0], 255);
    }
}
