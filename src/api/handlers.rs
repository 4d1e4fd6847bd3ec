use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use super::{ApiError, AppState, AuthSession};
use crate::auth::{AuthenticatedSession, Registration};
use crate::converters::{AudioSummary, OcrResult};
use crate::database::database::UserRecord;
use crate::document::validation;
use crate::document::{DocumentSummary, IngestReport};
use crate::llm::{ChatMessage, RagAnswer};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[validate(length(min = 1, max = 32))]
    pub phone: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub session_id: String,
    pub user: UserRecord,
}

impl From<AuthenticatedSession> for SessionResponse {
    fn from(session: AuthenticatedSession) -> Self {
        Self {
            token: session.token,
            session_id: session.session_id,
            user: session.user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub source: String,
    pub deleted: usize,
}

#[derive(Debug, Serialize)]
pub struct PdfChatResponse {
    pub answer: String,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// One uploaded file plus the plain text fields sent next to it.
struct Upload {
    file_name: String,
    bytes: Vec<u8>,
    fields: HashMap<String, String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut file = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::bad_request("The uploaded file has no name"))?;
            let bytes = field.bytes().await?;
            file = Some((file_name, bytes.to_vec()));
        } else {
            fields.insert(name, field.text().await?);
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| ApiError::bad_request("Attach the file in a field named 'file'"))?;
    Ok(Upload {
        file_name,
        bytes,
        fields,
    })
}

pub async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        status: "Server is running and healthy".to_string(),
    })
}

pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> ApiResult<SessionResponse> {
    request.validate()?;
    let session = state
        .services
        .auth
        .register(Registration {
            username: request.username,
            email: request.email,
            password: request.password,
            phone: request.phone,
        })
        .await?;
    Ok(Json(session.into()))
}

pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> ApiResult<SessionResponse> {
    request.validate()?;
    let session = state.services.auth.login(&request.email, &request.password).await?;
    Ok(Json(session.into()))
}

pub async fn logout(State(state): State<AppState>, auth: AuthSession) -> ApiResult<ApiResponse> {
    state.services.auth.logout(&auth.claims.sid);
    Ok(Json(ApiResponse {
        status: "Logged out".to_string(),
    }))
}

pub async fn account(State(state): State<AppState>, auth: AuthSession) -> ApiResult<UserRecord> {
    let user = state
        .services
        .auth
        .database()
        .find_user(&auth.claims.email)
        .await
        .map_err(crate::auth::AuthError::from)?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists, please register again"))?;

    auth.session.lock().await.set_balance(user.coins);
    Ok(Json(user))
}

pub async fn chat(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(request): Json<ChatRequest>,
) -> ApiResult<RagAnswer> {
    request.validate()?;
    let mut session = auth.session.lock().await;
    let answer = state.services.rag.ask(&mut session, &request.message).await?;
    Ok(Json(answer))
}

pub async fn history(auth: AuthSession) -> ApiResult<Vec<ChatMessage>> {
    let session = auth.session.lock().await;
    Ok(Json(session.history().to_vec()))
}

pub async fn list_documents(State(state): State<AppState>, auth: AuthSession) -> ApiResult<Vec<DocumentSummary>> {
    let namespace = auth.session.lock().await.namespace().clone();
    let documents = state.services.ingestor.list_documents(&namespace).await?;
    Ok(Json(documents))
}

pub async fn upload_document(
    State(state): State<AppState>,
    auth: AuthSession,
    multipart: Multipart,
) -> ApiResult<IngestReport> {
    let upload = read_upload(multipart).await?;
    let kind = validation::detect_document(&upload.file_name, &upload.bytes).map_err(crate::document::IngestError::from)?;

    let mut session = auth.session.lock().await;
    let report = state
        .services
        .ingestor
        .ingest(&mut session, &upload.file_name, upload.bytes, kind)
        .await?;
    Ok(Json(report))
}

pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(source): Path<String>,
) -> ApiResult<DeleteResponse> {
    let namespace = auth.session.lock().await.namespace().clone();
    let deleted = state.services.ingestor.delete_document(&namespace, &source).await?;
    Ok(Json(DeleteResponse { source, deleted }))
}

pub async fn convert_image(
    State(state): State<AppState>,
    auth: AuthSession,
    multipart: Multipart,
) -> ApiResult<OcrResult> {
    let upload = read_upload(multipart).await?;
    let mut session = auth.session.lock().await;
    let result = state.services.image_to_text.convert(&mut session, upload.bytes).await?;
    Ok(Json(result))
}

pub async fn convert_audio(
    State(state): State<AppState>,
    _auth: AuthSession,
    multipart: Multipart,
) -> ApiResult<AudioSummary> {
    let upload = read_upload(multipart).await?;
    let summary = state.services.audio.summarize(&upload.file_name, upload.bytes).await?;
    Ok(Json(summary))
}

pub async fn pdf_chat(State(state): State<AppState>, _auth: AuthSession, multipart: Multipart) -> ApiResult<PdfChatResponse> {
    let upload = read_upload(multipart).await?;
    let question = upload
        .fields
        .get("question")
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("Send your question in a field named 'question'"))?;

    let answer = state.services.pdf_chat.ask(upload.bytes, &question).await?;
    Ok(Json(PdfChatResponse { answer }))
}
