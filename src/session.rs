use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::identity::Identity;
use crate::database::vector_db::{Namespace, VectorDBError};
use crate::llm::chat::ChatMessage;

/// Everything one signed-in user accumulates between login and logout.
#[derive(Debug, Clone)]
pub struct SessionState {
    session_id: String,
    identity: Identity,
    namespace: Namespace,
    history: Vec<ChatMessage>,
    balance: i64,
    created_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(identity: Identity, balance: i64) -> Result<Self, VectorDBError> {
        let namespace = Namespace::new(identity.uid.clone())?;
        Ok(Self {
            session_id: Uuid::new_v4().to_string(),
            identity,
            namespace,
            history: Vec::new(),
            balance,
            created_at: Utc::now(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn email(&self) -> &str {
        &self.identity.email
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The last `n` turns, oldest first.
    pub fn recent_history(&self, n: usize) -> &[ChatMessage] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn record_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.history.push(ChatMessage::user(user));
        self.history.push(ChatMessage::assistant(assistant));
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn set_balance(&mut self, balance: i64) {
        self.balance = balance;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Live sessions of this process, keyed by session id.
#[derive(Default, Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, identity: Identity, balance: i64) -> Result<(String, SessionHandle), VectorDBError> {
        let state = SessionState::new(identity, balance)?;
        let session_id = state.session_id().to_string();
        let handle = Arc::new(Mutex::new(state));
        self.sessions.write().insert(session_id.clone(), handle.clone());
        log::info!("Session {} started", session_id);
        Ok((session_id, handle))
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            log::info!("Session {} discarded", session_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
