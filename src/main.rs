use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dotenv::dotenv;
use rustyline::error::ReadlineError;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use cognit_assistant::api;
use cognit_assistant::commands::account::{self, LineEditor};
use cognit_assistant::commands::{print_help, CommandHandler, CommandOutcome};
use cognit_assistant::{AppConfig, Services};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serve the HTTP API instead of starting the interactive shell
    #[arg(long)]
    api: bool,

    #[arg(long, default_value = "3000")]
    port: u16,

    /// Log in with this email when the shell starts
    #[arg(long)]
    email: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize colored output
    colored::control::set_override(true);

    // Load environment variables
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = AppConfig::from_env().context("Invalid configuration")?;
    let services = Services::from_config(&config).await?;

    if args.api {
        run_api_server(services, args.port).await
    } else {
        run_cli_mode(services, args.email).await
    }
}

async fn run_cli_mode(services: Services, mut email: Option<String>) -> Result<()> {
    let mut rl = LineEditor::new()?;

    loop {
        let signed_in = account::sign_in(&mut rl, &services, email.take())
            .await
            .map_err(anyhow::Error::msg)?;
        let Some(session) = signed_in else {
            return Ok(());
        };

        let mut handler = CommandHandler::new(services.clone(), session);
        print_help();

        loop {
            let line = match rl.readline("👤 ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    return Ok(());
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    return Ok(());
                }
                Err(err) => {
                    println!("Error: {:?}", err);
                    return Ok(());
                }
            };

            let input = line.trim();
            let _ = rl.add_history_entry(input);

            match handler.handle_command(input).await {
                Ok(CommandOutcome::Continue) => {}
                Ok(CommandOutcome::LoggedOut) => break,
                Ok(CommandOutcome::Exit) => return Ok(()),
                Err(e) => println!("{}", e.red()),
            }
        }
    }
}

async fn run_api_server(services: Services, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = api::create_api(services);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    log::info!("API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
