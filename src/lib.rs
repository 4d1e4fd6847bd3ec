pub mod api;
pub mod app;
pub mod auth;
pub mod commands;
pub mod config;
pub mod converters;
pub mod database;
pub mod document;
pub mod llm;
pub mod providers;
pub mod session;

// Re-export commonly used items
pub use app::Services;
pub use config::AppConfig;
pub use session::{SessionRegistry, SessionState};
