use colored::Colorize;

pub fn print_help() {
    println!("\n🤖 {}", "Cognit Assistant Commands:".bold());
    println!("  Just type a question to ask about your documents");
    println!("  Examples:");
    println!("    - what does the contract say about termination?");
    println!("    - summarize the sales spreadsheet");
    println!();

    println!("📄 Document Commands:");
    println!("  docs               - List your indexed documents");
    println!("  upload <path>      - Index a PDF, CSV or TXT file");
    println!("  delete <source>    - Remove a document from your index");
    println!();

    println!("🔄 Converters:");
    println!("  ocr <image>             - Extract text from a PNG or JPEG image");
    println!("  audio <file>            - Transcribe and summarize an mp3, wav or m4a file");
    println!("  pdf <file> <question>   - Ask a question about a single PDF");
    println!();

    println!("⚙️ Account Commands:");
    println!("  balance  - Show your coin balance");
    println!("  history  - Show this session's conversation");
    println!("  logout   - End this session");
    println!("  help     - Show this help menu");
    println!("  exit     - Exit the program");
    println!();
}
