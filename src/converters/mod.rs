pub mod audio;
pub mod ocr;
pub mod pdf_chat;

use thiserror::Error;

use crate::database::DatabaseError;
use crate::document::loader::LoaderError;
use crate::document::validation::ValidationError;
use crate::providers::traits::ProviderError;

pub use audio::{AudioSummarizer, AudioSummary};
pub use ocr::{ImageToText, OcrEngine, OcrResult, TesseractCli};
pub use pdf_chat::{PageRenderer, PdfChat, Pdftoppm};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Invalid file: {0}")]
    Validation(#[from] ValidationError),
    #[error("Insufficient balance: {available} coins available, {required} required")]
    InsufficientBalance { available: i64, required: i64 },
    #[error("Could not decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("OCR failed: {0}")]
    Ocr(String),
    #[error("No text was found in the file")]
    NoText,
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("Language model error: {0}")]
    Provider(#[from] ProviderError),
    #[error("The language model is busy, please try again later")]
    Busy,
    #[error(transparent)]
    Database(DatabaseError),
    #[error("Conversion task failed: {0}")]
    Task(String),
}

impl From<DatabaseError> for ConvertError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::InsufficientBalance { available, required } => {
                ConvertError::InsufficientBalance { available, required }
            }
            other => ConvertError::Database(other),
        }
    }
}
