use image::ImageFormat;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use super::loader::FileKind;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const MAX_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;
pub const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("The file is empty")]
    Empty,
    #[error("The file is too large ({size} bytes, limit is {limit} bytes)")]
    TooLarge { size: usize, limit: usize },
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("The file content does not look like a {0} file")]
    ContentMismatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    M4a,
}

fn check_size(bytes: &[u8], limit: usize) -> Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::Empty);
    }
    if bytes.len() > limit {
        return Err(ValidationError::TooLarge {
            size: bytes.len(),
            limit,
        });
    }
    Ok(())
}

fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// Accepts PNG and JPEG up to 5 MB, recognised by content.
pub fn validate_image(bytes: &[u8]) -> Result<ImageFormat, ValidationError> {
    check_size(bytes, MAX_IMAGE_BYTES)?;
    match image::guess_format(bytes) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => Ok(format),
        Ok(other) => Err(ValidationError::UnsupportedType(format!("{:?}", other))),
        Err(_) => Err(ValidationError::ContentMismatch("PNG or JPEG".to_string())),
    }
}

pub fn validate_pdf(bytes: &[u8]) -> Result<(), ValidationError> {
    check_size(bytes, MAX_DOCUMENT_BYTES)?;
    if !bytes.starts_with(b"%PDF-") {
        return Err(ValidationError::ContentMismatch("PDF".to_string()));
    }
    Ok(())
}

/// Checks that `bytes` fit the limits and really are a `kind` document.
pub fn validate_document(kind: FileKind, bytes: &[u8]) -> Result<(), ValidationError> {
    match kind {
        FileKind::Pdf => validate_pdf(bytes),
        FileKind::Csv | FileKind::Txt => {
            check_size(bytes, MAX_DOCUMENT_BYTES)?;
            std::str::from_utf8(bytes)
                .map(|_| ())
                .map_err(|_| ValidationError::ContentMismatch(kind.as_str().to_uppercase()))
        }
    }
}

/// Kind from the file name, then content checks for that kind.
pub fn detect_document(file_name: &str, bytes: &[u8]) -> Result<FileKind, ValidationError> {
    let kind = FileKind::from_file_name(file_name)
        .ok_or_else(|| ValidationError::UnsupportedType(extension(file_name)))?;
    validate_document(kind, bytes)?;
    Ok(kind)
}

pub fn validate_audio(file_name: &str, bytes: &[u8]) -> Result<AudioFormat, ValidationError> {
    let format = match extension(file_name).as_str() {
        "mp3" => AudioFormat::Mp3,
        "wav" => AudioFormat::Wav,
        "m4a" => AudioFormat::M4a,
        other => return Err(ValidationError::UnsupportedType(other.to_string())),
    };
    check_size(bytes, MAX_AUDIO_BYTES)?;
    Ok(format)
}
