use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::database::vector_db::Metadata;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read PDF: {0}")]
    Pdf(String),
    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("File is not valid UTF-8 text")]
    Encoding,
}

/// Document types accepted for indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Pdf,
    Txt,
}

impl FileKind {
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name).extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "csv" => Some(FileKind::Csv),
            "pdf" => Some(FileKind::Pdf),
            "txt" => Some(FileKind::Txt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Pdf => "pdf",
            FileKind::Txt => "txt",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of loaded text (a PDF page, a CSV row, a whole TXT file).
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub text: String,
    pub metadata: Metadata,
}

pub fn load(kind: FileKind, file_name: &str, bytes: &[u8]) -> Result<Vec<LoadedDocument>, LoaderError> {
    let documents = match kind {
        FileKind::Pdf => load_pdf(bytes)?,
        FileKind::Csv => load_csv(bytes)?,
        FileKind::Txt => load_txt(bytes)?,
    };
    log::debug!("Loaded {} {} sections from {}", documents.len(), kind, file_name);
    Ok(documents)
}

pub fn pdf_text(bytes: &[u8]) -> Result<String, LoaderError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| LoaderError::Pdf(e.to_string()))
}

fn load_pdf(bytes: &[u8]) -> Result<Vec<LoadedDocument>, LoaderError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| LoaderError::Pdf(e.to_string()))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(page, text)| {
            let mut metadata = Metadata::new();
            metadata.insert("page".to_string(), json!(page));
            LoadedDocument { text, metadata }
        })
        .collect())
}

fn load_csv(bytes: &[u8]) -> Result<Vec<LoadedDocument>, LoaderError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut documents = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let text = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| format!("{}: {}", header.trim(), value.trim()))
            .collect::<Vec<_>>()
            .join("\n");

        let mut metadata = Metadata::new();
        metadata.insert("row".to_string(), json!(row));
        documents.push(LoadedDocument { text, metadata });
    }

    Ok(documents)
}

fn load_txt(bytes: &[u8]) -> Result<Vec<LoadedDocument>, LoaderError> {
    let text = std::str::from_utf8(bytes).map_err(|_| LoaderError::Encoding)?;
    Ok(vec![LoadedDocument {
        text: text.to_string(),
        metadata: Metadata::new(),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(FileKind::from_file_name("Report.PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_file_name("data.csv"), Some(FileKind::Csv));
        assert_eq!(FileKind::from_file_name("notes.txt"), Some(FileKind::Txt));
        assert_eq!(FileKind::from_file_name("photo.png"), None);
        assert_eq!(FileKind::from_file_name("README"), None);
    }

    #[test]
    fn test_csv_rows_become_documents() {
        let csv = b"name,city\nAna,Recife\nBruno,Natal\n";
        let docs = load(FileKind::Csv, "people.csv", csv).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "name: Ana\ncity: Recife");
        assert_eq!(docs[1].metadata["row"], json!(1));
    }

    #[test]
    fn test_txt_requires_utf8() {
        let docs = load(FileKind::Txt, "a.txt", "olá mundo".as_bytes()).unwrap();
        assert_eq!(docs[0].text, "olá mundo");
        assert!(matches!(load(FileKind::Txt, "a.txt", &[0xff, 0xfe, 0x00]), Err(LoaderError::Encoding)));
    }

    #[test]
    fn test_broken_pdf_is_an_error() {
        assert!(matches!(load(FileKind::Pdf, "a.pdf", b"%PDF-1.4 truncated"), Err(LoaderError::Pdf(_))));
    }
}
