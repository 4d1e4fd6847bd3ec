use std::sync::Arc;

use super::identity::IdentityProvider;
use super::password::PasswordHasherConfig;
use super::rate_limit::LoginRateLimiter;
use super::token::{SessionClaims, TokenService};
use super::AuthError;
use crate::database::database::{NewUser, UserRecord, STARTING_COINS};
use crate::database::Database;
use crate::session::{SessionHandle, SessionRegistry};

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone: String,
}

/// A freshly opened session and the token that refers to it.
#[derive(Clone)]
pub struct AuthenticatedSession {
    pub token: String,
    pub session_id: String,
    pub session: SessionHandle,
    pub user: UserRecord,
}

pub struct AuthService {
    db: Database,
    identity: Arc<dyn IdentityProvider>,
    hasher: PasswordHasherConfig,
    tokens: TokenService,
    limiter: LoginRateLimiter,
    sessions: SessionRegistry,
    starting_coins: i64,
}

fn require(value: &str, field: &str) -> Result<String, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

impl AuthService {
    pub fn new(
        db: Database,
        identity: Arc<dyn IdentityProvider>,
        hasher: PasswordHasherConfig,
        tokens: TokenService,
        sessions: SessionRegistry,
    ) -> Self {
        Self {
            db,
            identity,
            hasher,
            tokens,
            limiter: LoginRateLimiter::default(),
            sessions,
            starting_coins: STARTING_COINS,
        }
    }

    pub fn with_limiter(mut self, limiter: LoginRateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_starting_coins(mut self, coins: i64) -> Self {
        self.starting_coins = coins;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthenticatedSession, AuthError> {
        let email = require(email, "Email")?;
        if password.is_empty() {
            return Err(AuthError::Validation("Password is required".to_string()));
        }

        self.limiter.check(&email)?;

        let Some(identity) = self.identity.lookup_by_email(&email).await? else {
            log::warn!("Login failed for {}: unknown to {}", email, self.identity.name());
            return Err(AuthError::InvalidCredentials);
        };

        let stored = self.db.password_hash(&email).await?;
        let verified = stored
            .as_deref()
            .map(|hash| self.hasher.verify(password, hash))
            .unwrap_or(false);
        if !verified {
            log::warn!("Login failed for {}: wrong password", email);
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .db
            .find_user(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let (session_id, session) = self.sessions.create(identity, user.coins)?;
        let token = self.tokens.issue(&email, &session_id)?;
        log::info!("{} logged in", email);

        Ok(AuthenticatedSession {
            token,
            session_id,
            session,
            user,
        })
    }

    pub async fn register(&self, registration: Registration) -> Result<AuthenticatedSession, AuthError> {
        let username = require(&registration.username, "Username")?;
        let email = require(&registration.email, "Email")?;
        let phone = require(&registration.phone, "Phone")?;
        if registration.password.is_empty() {
            return Err(AuthError::Validation("Password is required".to_string()));
        }
        if !email.contains('@') {
            return Err(AuthError::Validation("Email is not valid".to_string()));
        }

        if self.db.user_exists(&email, &username).await? {
            return Err(AuthError::DuplicateUser);
        }

        let password_hash = self.hasher.hash(&registration.password)?;
        let user = self
            .db
            .create_user(NewUser {
                username: username.clone(),
                email: email.clone(),
                password_hash,
                phone,
                uid: username.clone(),
                coins: self.starting_coins,
            })
            .await?;

        let identity = self
            .identity
            .create_user(&username, &email, &registration.password)
            .await?;

        let (session_id, session) = self.sessions.create(identity, user.coins)?;
        let token = self.tokens.issue(&email, &session_id)?;
        log::info!("Registered {} with {} coins", email, user.coins);

        Ok(AuthenticatedSession {
            token,
            session_id,
            session,
            user,
        })
    }

    /// Resolves a bearer token to its live session.
    pub async fn authenticate(&self, token: &str) -> Result<(SessionClaims, SessionHandle), AuthError> {
        let claims = self.tokens.verify(token)?;
        let session = self.sessions.get(&claims.sid).ok_or(AuthError::SessionNotFound)?;

        if session.lock().await.email() != claims.email {
            return Err(AuthError::InvalidToken("token does not match its session".to_string()));
        }

        Ok((claims, session))
    }

    pub fn logout(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::DatabaseIdentity;
    use crate::auth::token::DEFAULT_TOKEN_TTL;

    async fn service() -> AuthService {
        let db = Database::in_memory().await.unwrap();
        AuthService::new(
            db.clone(),
            Arc::new(DatabaseIdentity::new(db)),
            PasswordHasherConfig::new(1_000),
            TokenService::new("secret", DEFAULT_TOKEN_TTL),
            SessionRegistry::new(),
        )
    }

    fn alice() -> Registration {
        Registration {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "s3cret!".to_string(),
            phone: "555-0100".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service().await;
        let registered = auth.register(alice()).await.unwrap();
        assert_eq!(registered.user.coins, 100);
        assert_eq!(registered.session.lock().await.namespace().as_str(), "alice");

        let logged_in = auth.login("alice@example.com", "s3cret!").await.unwrap();
        let (claims, _) = auth.authenticate(&logged_in.token).await.unwrap();
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(auth.sessions().len(), 2);
    }

    #[tokio::test]
    async fn test_register_requires_all_fields() {
        let auth = service().await;
        let mut missing_phone = alice();
        missing_phone.phone = "  ".to_string();
        assert!(matches!(auth.register(missing_phone).await, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let auth = service().await;
        auth.register(alice()).await.unwrap();
        let mut same_username = alice();
        same_username.email = "other@example.com".to_string();
        assert!(matches!(auth.register(same_username).await, Err(AuthError::DuplicateUser)));
    }

    #[tokio::test]
    async fn test_wrong_password_and_lockout() {
        let auth = service().await;
        auth.register(alice()).await.unwrap();

        for _ in 0..5 {
            assert!(matches!(
                auth.login("alice@example.com", "wrong").await,
                Err(AuthError::InvalidCredentials)
            ));
        }
        // even the right password is refused while locked out
        assert!(matches!(
            auth.login("alice@example.com", "s3cret!").await,
            Err(AuthError::TooManyAttempts { .. })
        ));
    }

    #[tokio::test]
    async fn test_logout_invalidates_token() {
        let auth = service().await;
        let registered = auth.register(alice()).await.unwrap();

        assert!(auth.logout(&registered.session_id));
        assert!(matches!(
            auth.authenticate(&registered.token).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_blank_login_fields_rejected() {
        let auth = service().await;
        assert!(matches!(auth.login(" ", "pw").await, Err(AuthError::Validation(_))));
        assert!(matches!(auth.login("a@example.com", "").await, Err(AuthError::Validation(_))));
    }
}
