pub mod identity;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod token;

use thiserror::Error;

use crate::database::DatabaseError;
use crate::database::vector_db::VectorDBError;

pub use identity::{DatabaseIdentity, FirebaseIdentity, Identity, IdentityProvider};
pub use service::{AuthService, AuthenticatedSession, Registration};
pub use token::{SessionClaims, TokenService};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Too many login attempts, try again in {retry_after_secs} seconds")]
    TooManyAttempts { retry_after_secs: u64 },
    #[error("Session expired, please log in again")]
    TokenExpired,
    #[error("Invalid session token, please log in again: {0}")]
    InvalidToken(String),
    #[error("Session not found, please log in again")]
    SessionNotFound,
    #[error("A user with this email or username already exists")]
    DuplicateUser,
    #[error("Identity provider error: {0}")]
    Identity(String),
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
    #[error(transparent)]
    Database(DatabaseError),
    #[error("Cannot open a session for this user: {0}")]
    Session(#[from] VectorDBError),
}

impl From<DatabaseError> for AuthError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::DuplicateUser => AuthError::DuplicateUser,
            other => AuthError::Database(other),
        }
    }
}
