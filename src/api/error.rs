use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::ValidationErrors;

use crate::auth::AuthError;
use crate::converters::ConvertError;
use crate::document::IngestError;
use crate::llm::rag::PipelineError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

/// Every handler failure, already mapped to the status code the client sees.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        log::error!("Internal error: {}", err);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong on our side, please try again",
        )
    }

    fn upstream(err: impl std::fmt::Display) -> Self {
        log::error!("External service failed: {}", err);
        Self::new(
            StatusCode::BAD_GATEWAY,
            format!("An external service failed, please try again later ({})", err),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                status: "error".to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(_) => ApiError::bad_request(err.to_string()),
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::InvalidToken(_)
            | AuthError::SessionNotFound => ApiError::unauthorized(err.to_string()),
            AuthError::TooManyAttempts { .. } => ApiError::new(StatusCode::TOO_MANY_REQUESTS, err.to_string()),
            AuthError::DuplicateUser => ApiError::new(StatusCode::CONFLICT, err.to_string()),
            AuthError::Identity(_) => ApiError::upstream(err),
            AuthError::PasswordHash(_) | AuthError::Database(_) | AuthError::Session(_) => ApiError::internal(err),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::upstream(err)
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(_) | IngestError::Loader(_) | IngestError::NoContent(_) => {
                ApiError::bad_request(err.to_string())
            }
            IngestError::InsufficientBalance { .. } => ApiError::new(StatusCode::PAYMENT_REQUIRED, err.to_string()),
            IngestError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, err.to_string()),
            IngestError::Embedding(_) | IngestError::VectorStore(_) => ApiError::upstream(err),
            IngestError::Database(_) | IngestError::Task(_) => ApiError::internal(err),
        }
    }
}

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::Validation(_) | ConvertError::Image(_) | ConvertError::Loader(_) | ConvertError::NoText => {
                ApiError::bad_request(err.to_string())
            }
            ConvertError::InsufficientBalance { .. } => ApiError::new(StatusCode::PAYMENT_REQUIRED, err.to_string()),
            ConvertError::Busy => ApiError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            ConvertError::Provider(_) => ApiError::upstream(err),
            ConvertError::Ocr(_) | ConvertError::Database(_) | ConvertError::Task(_) => ApiError::internal(err),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        ApiError::bad_request(format!("Invalid request: {}", err))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::bad_request(format!("Invalid upload: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ValidationError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(AuthError::TokenExpired).status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(AuthError::TooManyAttempts { retry_after_secs: 30 }).status,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(IngestError::InsufficientBalance {
                available: 10,
                required: 50
            })
            .status,
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::from(IngestError::NotFound("a.pdf".to_string())).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ConvertError::Validation(ValidationError::Empty)).status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_messages_are_actionable() {
        let err = ApiError::from(AuthError::TokenExpired);
        assert!(err.message.contains("log in again"));

        let err = ApiError::from(ConvertError::InsufficientBalance {
            available: 5,
            required: 30,
        });
        assert!(err.message.contains("30"));
    }
}
