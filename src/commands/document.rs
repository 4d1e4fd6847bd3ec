use colored::Colorize;
use std::path::Path;

use super::spinner;
use crate::app::Services;
use crate::document::validation;
use crate::session::SessionHandle;

pub(crate) fn file_name(path: &str) -> Result<String, String> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| format!("Not a file path: {}", path))
}

pub(crate) async fn read_file(path: &str) -> Result<Vec<u8>, String> {
    tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", path, e))
}

pub async fn list(services: &Services, session: &SessionHandle) -> Result<(), String> {
    let namespace = session.lock().await.namespace().clone();
    let documents = services
        .ingestor
        .list_documents(&namespace)
        .await
        .map_err(|e| format!("Failed to list documents: {}", e))?;

    if documents.is_empty() {
        println!("No documents yet. Use 'upload <path>' to add one.");
        return Ok(());
    }

    println!("\n📚 Your documents:");
    for doc in documents {
        println!(
            "  • {} ({} chunks, {})",
            doc.source.bright_yellow(),
            doc.chunks.to_string().cyan(),
            doc.file_type.as_deref().unwrap_or("unknown type")
        );
        println!("    {}", doc.preview.replace('\n', " ").bright_black());
    }
    println!();
    Ok(())
}

pub async fn upload(services: &Services, session: &SessionHandle, path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Usage: upload <path>".to_string());
    }

    let name = file_name(path)?;
    let bytes = read_file(path).await?;
    let kind = validation::detect_document(&name, &bytes).map_err(|e| format!("Cannot upload {}: {}", name, e))?;

    println!("📄 Uploading {} ({} bytes, {})", name.bright_yellow(), bytes.len(), kind);
    let pb = spinner("Splitting and indexing...");
    let result = {
        let mut session = session.lock().await;
        services.ingestor.ingest(&mut session, &name, bytes, kind).await
    };
    pb.finish_and_clear();

    let report = result.map_err(|e| format!("Upload failed: {}", e))?;
    println!(
        "✅ Indexed {} chunks from {}. Balance: {} coins",
        report.chunks.to_string().cyan(),
        report.file_name.bright_yellow(),
        report.balance.to_string().cyan()
    );
    for (i, preview) in report.preview.iter().enumerate() {
        println!("  {} {}", format!("[{}]", i + 1).bright_black(), preview.replace('\n', " "));
    }
    Ok(())
}

pub async fn delete(services: &Services, session: &SessionHandle, source: &str) -> Result<(), String> {
    if source.is_empty() {
        return Err("Usage: delete <source>".to_string());
    }

    let namespace = session.lock().await.namespace().clone();
    let deleted = services
        .ingestor
        .delete_document(&namespace, source)
        .await
        .map_err(|e| format!("Failed to delete {}: {}", source, e))?;
    println!("🗑️  Removed {} ({} chunks)", source.bright_yellow(), deleted);
    Ok(())
}
