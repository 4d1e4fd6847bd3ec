mod error;
pub mod handlers;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{header, request::Parts},
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::app::Services;
use crate::auth::SessionClaims;
use crate::document::validation::MAX_AUDIO_BYTES;
use crate::session::SessionHandle;

pub use error::{ApiError, ErrorResponse};

/// Largest accepted request body. Per-kind limits are checked after upload.
pub const MAX_BODY_BYTES: usize = MAX_AUDIO_BYTES + 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

/// The caller's live session, resolved from `Authorization: Bearer <token>`.
pub struct AuthSession {
    pub claims: SessionClaims,
    pub session: SessionHandle,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token, please log in"))?;
        let (claims, session) = state.services.auth.authenticate(token).await?;
        Ok(AuthSession { claims, session })
    }
}

/// Create and configure the API router
pub fn create_api(services: Services) -> Router {
    let state = AppState::new(services);

    // Fully permissive CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/account", get(handlers::account))
        .route("/chat", post(handlers::chat))
        .route("/chat/history", get(handlers::history))
        .route("/documents", get(handlers::list_documents).post(handlers::upload_document))
        .route("/documents/:source", delete(handlers::delete_document))
        .route("/convert/image", post(handlers::convert_image))
        .route("/convert/audio", post(handlers::convert_audio))
        .route("/pdf/chat", post(handlers::pdf_chat))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}
