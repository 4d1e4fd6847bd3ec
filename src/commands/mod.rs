use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::app::Services;
use crate::auth::AuthenticatedSession;
use crate::llm::RagAnswer;

pub mod account;
mod convert;
mod document;
mod system;

pub use system::print_help;

/// What the REPL should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    LoggedOut,
    Exit,
}

pub struct CommandHandler {
    services: Services,
    auth: AuthenticatedSession,
}

pub(crate) fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

impl CommandHandler {
    pub fn new(services: Services, auth: AuthenticatedSession) -> Self {
        Self { services, auth }
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<CommandOutcome, String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(CommandOutcome::Continue);
        }

        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        match command.to_lowercase().as_str() {
            "help" => system::print_help(),
            "exit" | "quit" => {
                self.services.auth.logout(&self.auth.session_id);
                println!("👋 Goodbye!");
                return Ok(CommandOutcome::Exit);
            }
            "logout" => {
                self.services.auth.logout(&self.auth.session_id);
                println!("🔒 Logged out of {}", self.auth.user.email.bright_yellow());
                return Ok(CommandOutcome::LoggedOut);
            }
            "balance" => self.show_balance().await?,
            "history" => self.show_history().await,
            "docs" => document::list(&self.services, &self.auth.session).await?,
            "upload" => document::upload(&self.services, &self.auth.session, rest).await?,
            "delete" => document::delete(&self.services, &self.auth.session, rest).await?,
            "ocr" => convert::ocr(&self.services, &self.auth.session, rest).await?,
            "audio" => convert::audio(&self.services, rest).await?,
            "pdf" => convert::pdf(&self.services, rest).await?,
            _ => self.handle_chat(input).await?,
        }

        Ok(CommandOutcome::Continue)
    }

    async fn show_balance(&self) -> Result<(), String> {
        let coins = self
            .services
            .auth
            .database()
            .get_coins(&self.auth.user.email)
            .await
            .map_err(|e| format!("Failed to read balance: {}", e))?;
        self.auth.session.lock().await.set_balance(coins);
        println!("💰 Balance: {} coins", coins.to_string().cyan());
        Ok(())
    }

    async fn show_history(&self) {
        let session = self.auth.session.lock().await;
        if session.history().is_empty() {
            println!("No messages yet.");
            return;
        }
        for message in session.history() {
            let role = format!("{:?}", message.role);
            println!("{} {}", format!("[{}]", role).bright_cyan(), message.content);
        }
    }

    async fn handle_chat(&mut self, input: &str) -> Result<(), String> {
        let pb = spinner("Thinking...");
        let result = {
            let mut session = self.auth.session.lock().await;
            self.services.rag.ask(&mut session, input).await
        };
        pb.finish_and_clear();

        match result {
            Ok(answer) => {
                print_answer(&answer);
                Ok(())
            }
            Err(e) => Err(format!("Failed to get an answer: {}", e)),
        }
    }
}

fn print_answer(answer: &RagAnswer) {
    if answer.fallback {
        println!("{}", answer.answer.yellow());
    } else {
        println!("{}", answer.answer.truecolor(255, 236, 179));
    }

    let mut sources: Vec<&str> = answer.chunks.iter().map(|c| c.source.as_str()).collect();
    sources.dedup();
    if !sources.is_empty() {
        println!("\n📚 Sources: {}", sources.join(", ").bright_black());
    }
    if answer.dropped_chunks > 0 {
        println!("✂️  {} chunk(s) left out to fit the context limit", answer.dropped_chunks);
    }
    println!();
}
