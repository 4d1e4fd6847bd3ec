use rusqlite::{params, ErrorCode, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_rusqlite::Connection;

pub const STARTING_COINS: i64 = 100;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("Database connection error: {0}")]
    Connection(String),
    #[error("A user with this email or username already exists")]
    DuplicateUser,
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Insufficient balance: {available} coins available, {required} required")]
    InsufficientBalance { available: i64, required: i64 },
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub username: String,
    pub email: String,
    pub phone: String,
    pub coins: i64,
    pub uid: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub uid: String,
    pub coins: i64,
}

enum DebitOutcome {
    Debited(i64),
    NotFound,
    Insufficient(i64),
}

/// Accounts and coin balances.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Self::from_connection(conn).await
    }

    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Self::from_connection(conn).await
    }

    async fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        let db = Self { conn: Arc::new(conn) };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS users (
                        id INTEGER PRIMARY KEY,
                        username TEXT UNIQUE NOT NULL,
                        email TEXT UNIQUE NOT NULL,
                        password_hash TEXT NOT NULL,
                        phone TEXT NOT NULL,
                        coins INTEGER NOT NULL DEFAULT 100 CHECK (coins >= 0),
                        uid TEXT UNIQUE NOT NULL,
                        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                    );",
                )?;
                Ok(())
            })
            .await?;

        log::info!("Database initialized successfully");
        Ok(())
    }

    pub async fn create_user(&self, user: NewUser) -> Result<UserRecord, DatabaseError> {
        let record = UserRecord {
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            coins: user.coins,
            uid: user.uid.clone(),
        };

        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    "INSERT INTO users (username, email, password_hash, phone, coins, uid)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![user.username, user.email, user.password_hash, user.phone, user.coins, user.uid],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        if !inserted {
            return Err(DatabaseError::DuplicateUser);
        }

        log::info!("Created user {}", record.email);
        Ok(record)
    }

    pub async fn user_exists(&self, email: &str, username: &str) -> Result<bool, DatabaseError> {
        let email = email.to_string();
        let username = username.to_string();
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE email = ?1 OR username = ?2",
                    params![email, username],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count > 0)
    }

    pub async fn find_user(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let email = email.to_string();
        let result = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT username, email, phone, coins, uid FROM users WHERE email = ?1",
                        [&email],
                        |row| {
                            Ok(UserRecord {
                                username: row.get(0)?,
                                email: row.get(1)?,
                                phone: row.get(2)?,
                                coins: row.get(3)?,
                                uid: row.get(4)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;

        Ok(result)
    }

    pub async fn password_hash(&self, email: &str) -> Result<Option<String>, DatabaseError> {
        let email = email.to_string();
        let result = self
            .conn
            .call(move |conn| {
                let hash = conn
                    .query_row("SELECT password_hash FROM users WHERE email = ?1", [&email], |row| row.get(0))
                    .optional()?;
                Ok(hash)
            })
            .await?;

        Ok(result)
    }

    /// Current balance, or 0 for an unknown email.
    pub async fn get_coins(&self, email: &str) -> Result<i64, DatabaseError> {
        let email = email.to_string();
        let coins = self
            .conn
            .call(move |conn| {
                let coins: Option<i64> = conn
                    .query_row("SELECT coins FROM users WHERE email = ?1", [&email], |row| row.get(0))
                    .optional()?;
                Ok(coins.unwrap_or(0))
            })
            .await?;

        Ok(coins)
    }

    /// Takes `amount` coins from the user and returns the new balance. The
    /// write lock is taken before the balance is read, so concurrent debits
    /// are serialised and the balance never goes negative.
    pub async fn debit_coins(&self, email: &str, amount: i64) -> Result<i64, DatabaseError> {
        if amount < 0 {
            return Err(DatabaseError::InvalidAmount(amount));
        }

        let owned_email = email.to_string();
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let balance: Option<i64> = tx
                    .query_row("SELECT coins FROM users WHERE email = ?1", [&owned_email], |row| row.get(0))
                    .optional()?;

                let outcome = match balance {
                    None => DebitOutcome::NotFound,
                    Some(available) if available < amount => DebitOutcome::Insufficient(available),
                    Some(available) => {
                        let changed = tx.execute(
                            "UPDATE users SET coins = coins - ?1 WHERE email = ?2 AND coins >= ?1",
                            params![amount, owned_email],
                        )?;
                        if changed == 0 {
                            DebitOutcome::Insufficient(available)
                        } else {
                            DebitOutcome::Debited(available - amount)
                        }
                    }
                };

                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        match outcome {
            DebitOutcome::Debited(balance) => {
                log::info!("Debited {} coins from {}, {} left", amount, email, balance);
                Ok(balance)
            }
            DebitOutcome::NotFound => Err(DatabaseError::UserNotFound(email.to_string())),
            DebitOutcome::Insufficient(available) => {
                log::warn!("Refused debit of {} coins from {} (balance {})", amount, email, available);
                Err(DatabaseError::InsufficientBalance {
                    available,
                    required: amount,
                })
            }
        }
    }

    pub async fn credit_coins(&self, email: &str, amount: i64) -> Result<i64, DatabaseError> {
        if amount < 0 {
            return Err(DatabaseError::InvalidAmount(amount));
        }

        let owned_email = email.to_string();
        let balance = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "UPDATE users SET coins = coins + ?1 WHERE email = ?2",
                    params![amount, owned_email],
                )?;
                let balance: Option<i64> = tx
                    .query_row("SELECT coins FROM users WHERE email = ?1", [&owned_email], |row| row.get(0))
                    .optional()?;
                tx.commit()?;
                Ok(balance)
            })
            .await?;

        let balance = balance.ok_or_else(|| DatabaseError::UserNotFound(email.to_string()))?;
        log::info!("Credited {} coins to {}, balance {}", amount, email, balance);
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password_hash: "hash".to_string(),
            phone: "+55 11 99999-0000".to_string(),
            uid: name.to_string(),
            coins: STARTING_COINS,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let db = Database::in_memory().await.unwrap();
        db.create_user(new_user("alice")).await.unwrap();

        let user = db.find_user("alice@example.com").await.unwrap().unwrap();
        assert_eq!(user.coins, 100);
        assert_eq!(user.uid, "alice");
        assert_eq!(db.password_hash("alice@example.com").await.unwrap().as_deref(), Some("hash"));
        assert!(db.find_user("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let db = Database::in_memory().await.unwrap();
        db.create_user(new_user("alice")).await.unwrap();

        let mut same_email = new_user("alice2");
        same_email.email = "alice@example.com".to_string();
        assert!(matches!(db.create_user(same_email).await, Err(DatabaseError::DuplicateUser)));
        assert!(db.user_exists("other@example.com", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_debit_outcomes() {
        let db = Database::in_memory().await.unwrap();
        db.create_user(new_user("alice")).await.unwrap();

        assert_eq!(db.debit_coins("alice@example.com", 30).await.unwrap(), 70);
        assert!(matches!(
            db.debit_coins("alice@example.com", 80).await,
            Err(DatabaseError::InsufficientBalance { available: 70, required: 80 })
        ));
        assert_eq!(db.get_coins("alice@example.com").await.unwrap(), 70);
        assert!(matches!(
            db.debit_coins("ghost@example.com", 1).await,
            Err(DatabaseError::UserNotFound(_))
        ));
        assert!(matches!(
            db.debit_coins("alice@example.com", -5).await,
            Err(DatabaseError::InvalidAmount(-5))
        ));
        assert_eq!(db.get_coins("ghost@example.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_credit_coins() {
        let db = Database::in_memory().await.unwrap();
        db.create_user(new_user("alice")).await.unwrap();
        assert_eq!(db.credit_coins("alice@example.com", 25).await.unwrap(), 125);
        assert!(db.credit_coins("ghost@example.com", 25).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.db");
        let first = Database::new(&path).await.unwrap();
        let second = Database::new(&path).await.unwrap();
        first.create_user(new_user("alice")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..6 {
            let db = if i % 2 == 0 { first.clone() } else { second.clone() };
            handles.push(tokio::spawn(async move { db.debit_coins("alice@example.com", 30).await }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 3);
        assert_eq!(first.get_coins("alice@example.com").await.unwrap(), 10);
    }
}
