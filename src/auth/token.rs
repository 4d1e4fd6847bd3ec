use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::AuthError;

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub email: String,
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and checks HS256 session tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, email: &str, session_id: &str) -> Result<String, AuthError> {
        self.issue_at(email, session_id, Utc::now().timestamp())
    }

    pub fn issue_at(&self, email: &str, session_id: &str, issued_at: i64) -> Result<String, AuthError> {
        let claims = SessionClaims {
            email: email.to_string(),
            sid: session_id.to_string(),
            iat: issued_at,
            exp: issued_at + self.ttl.as_secs() as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", DEFAULT_TOKEN_TTL)
    }

    #[test]
    fn test_round_trip_claims() {
        let token = service().issue("alice@example.com", "sid-1").unwrap();
        let claims = service().verify(&token).unwrap();
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.sid, "sid-1");
        assert_eq!(claims.exp - claims.iat, 7200);
    }

    #[test]
    fn test_expired_token_rejected() {
        let three_hours_ago = Utc::now().timestamp() - 3 * 60 * 60;
        let token = service().issue_at("alice@example.com", "sid-1", three_hours_ago).unwrap();
        assert!(matches!(service().verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let token = service().issue("alice@example.com", "sid-1").unwrap();
        let other = TokenService::new("another-secret", DEFAULT_TOKEN_TTL);
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken(_))));

        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[1] = parts[1].chars().rev().collect();
        assert!(matches!(service().verify(&parts.join(".")), Err(AuthError::InvalidToken(_))));
        assert!(matches!(service().verify("garbage"), Err(AuthError::InvalidToken(_))));
    }
}
