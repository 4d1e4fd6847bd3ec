use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use crate::app::Services;
use crate::auth::{AuthError, AuthenticatedSession, Registration};

pub type LineEditor = Editor<(), DefaultHistory>;

/// Reads one line; `None` when the user pressed Ctrl-C or Ctrl-D.
fn ask(rl: &mut LineEditor, prompt: &str) -> Result<Option<String>, String> {
    match rl.readline(prompt) {
        Ok(line) => Ok(Some(line.trim().to_string())),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(err) => Err(format!("Error: {:?}", err)),
    }
}

fn welcome(session: &AuthenticatedSession) {
    println!(
        "✅ Welcome, {}! Balance: {} coins",
        session.user.username.bright_yellow(),
        session.user.coins.to_string().cyan()
    );
}

/// Prompts until the user is logged in or registered. Returns `None` when the
/// user gives up.
pub async fn sign_in(
    rl: &mut LineEditor,
    services: &Services,
    mut email: Option<String>,
) -> Result<Option<AuthenticatedSession>, String> {
    loop {
        let entered = match email.take() {
            Some(email) => email,
            None => match ask(rl, "📧 Email (or 'register'): ")? {
                Some(line) => line,
                None => return Ok(None),
            },
        };
        if entered.is_empty() {
            continue;
        }

        let result = if entered.eq_ignore_ascii_case("register") {
            match register(rl, services).await? {
                Some(result) => result,
                None => return Ok(None),
            }
        } else {
            let Some(password) = ask(rl, "🔑 Password: ")? else {
                return Ok(None);
            };
            services.auth.login(&entered, &password).await
        };

        match result {
            Ok(session) => {
                welcome(&session);
                return Ok(Some(session));
            }
            Err(AuthError::TooManyAttempts { retry_after_secs }) => {
                println!("{}", format!("Too many attempts, wait {} seconds", retry_after_secs).red());
            }
            Err(e) => println!("{}", e.to_string().red()),
        }
    }
}

async fn register(
    rl: &mut LineEditor,
    services: &Services,
) -> Result<Option<Result<AuthenticatedSession, AuthError>>, String> {
    let mut fields = Vec::with_capacity(4);
    for prompt in ["👤 Username: ", "📧 Email: ", "🔑 Password: ", "📱 Phone: "] {
        match ask(rl, prompt)? {
            Some(value) => fields.push(value),
            None => return Ok(None),
        }
    }

    let mut fields = fields.into_iter();
    let registration = Registration {
        username: fields.next().unwrap_or_default(),
        email: fields.next().unwrap_or_default(),
        password: fields.next().unwrap_or_default(),
        phone: fields.next().unwrap_or_default(),
    };
    Ok(Some(services.auth.register(registration).await))
}
