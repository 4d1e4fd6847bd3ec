use colored::Colorize;

use super::document::{file_name, read_file};
use super::spinner;
use crate::app::Services;
use crate::session::SessionHandle;

pub async fn ocr(services: &Services, session: &SessionHandle, path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Usage: ocr <image>".to_string());
    }
    let bytes = read_file(path).await?;

    println!("🔍 Processing image: {}", path.bright_yellow());
    let pb = spinner("Reading text...");
    let result = {
        let mut session = session.lock().await;
        services.image_to_text.convert(&mut session, bytes).await
    };
    pb.finish_and_clear();

    let result = result.map_err(|e| format!("OCR failed: {}", e))?;
    println!("\n📝 Text ({}):", result.language.cyan());
    println!("{}", result.text.bright_green());
    println!("\n💰 Balance: {} coins", result.balance.to_string().cyan());
    Ok(())
}

pub async fn audio(services: &Services, path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Usage: audio <file>".to_string());
    }
    let name = file_name(path)?;
    let bytes = read_file(path).await?;

    let pb = spinner("Transcribing...");
    let result = services.audio.summarize(&name, bytes).await;
    pb.finish_and_clear();

    let summary = result.map_err(|e| format!("Audio summary failed: {}", e))?;
    println!("\n🎙️ Transcript:");
    println!("{}", summary.transcript.bright_black());
    println!("\n📝 Summary:");
    println!("{}", summary.summary.bright_green());
    Ok(())
}

pub async fn pdf(services: &Services, args: &str) -> Result<(), String> {
    let (path, question) = args
        .split_once(char::is_whitespace)
        .map(|(path, question)| (path, question.trim()))
        .filter(|(_, question)| !question.is_empty())
        .ok_or("Usage: pdf <file> <question>")?;
    let bytes = read_file(path).await?;

    let pb = spinner("Reading the PDF...");
    let result = services.pdf_chat.ask(bytes, question).await;
    pb.finish_and_clear();

    let answer = result.map_err(|e| format!("PDF chat failed: {}", e))?;
    println!("{}", answer.truecolor(255, 236, 179));
    Ok(())
}
