use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::AuthError;
use crate::database::Database;
use crate::providers::utils::check_response;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// A user as the identity provider knows them. `uid` doubles as the user's
/// vector store namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn lookup_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError>;

    async fn create_user(&self, uid: &str, email: &str, password: &str) -> Result<Identity, AuthError>;

    fn name(&self) -> &str;
}

/// Resolves identities from the accounts table itself.
#[derive(Clone)]
pub struct DatabaseIdentity {
    db: Database,
}

impl DatabaseIdentity {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityProvider for DatabaseIdentity {
    async fn lookup_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        Ok(self.db.find_user(email).await?.map(|user| Identity {
            uid: user.uid,
            email: user.email,
        }))
    }

    // The account row written at registration already carries the uid.
    async fn create_user(&self, uid: &str, email: &str, _password: &str) -> Result<Identity, AuthError> {
        Ok(Identity {
            uid: uid.to_string(),
            email: email.to_string(),
        })
    }

    fn name(&self) -> &str {
        "database"
    }
}

/// Firebase Authentication through the Identity Toolkit admin REST API.
#[derive(Clone)]
pub struct FirebaseIdentity {
    client: Client,
    base_url: String,
    project_id: String,
    access_token: String,
}

impl FirebaseIdentity {
    pub fn new(project_id: &str, access_token: &str) -> Self {
        Self::with_base_url(IDENTITY_TOOLKIT_URL, project_id, access_token)
    }

    pub fn with_base_url(base_url: &str, project_id: &str, access_token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/projects/{}/{}", self.base_url, self.project_id, path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, AuthError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Identity(e.to_string()))?;

        let response = check_response(response)
            .await
            .map_err(|e| AuthError::Identity(e.to_string()))?;

        response.json().await.map_err(|e| AuthError::Identity(e.to_string()))
    }
}

fn identity_from_user(user: &Value) -> Option<Identity> {
    Some(Identity {
        uid: user.get("localId")?.as_str()?.to_string(),
        email: user.get("email")?.as_str()?.to_string(),
    })
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn lookup_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        let body = self.post("accounts:lookup", json!({ "email": [email] })).await?;

        Ok(body
            .get("users")
            .and_then(|users| users.get(0))
            .and_then(identity_from_user))
    }

    async fn create_user(&self, uid: &str, email: &str, password: &str) -> Result<Identity, AuthError> {
        let body = self
            .post(
                "accounts",
                json!({
                    "localId": uid,
                    "email": email,
                    "password": password,
                }),
            )
            .await?;

        log::info!("Created Firebase user {}", uid);
        Ok(identity_from_user(&body).unwrap_or_else(|| Identity {
            uid: uid.to_string(),
            email: email.to_string(),
        }))
    }

    fn name(&self) -> &str {
        "firebase"
    }
}
