//! Durable persistence for the signed-in session.
//!
//! The bearer token and the cached user summary are one record: they are
//! written together and removed together. Readers never observe one without
//! the other.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::domain::UserSummary;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user: UserSummary,
}

impl StoredSession {
    pub fn new(token: impl Into<String>, user: UserSummary) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cached user summary is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Persistence for the current credential pair.
///
/// `read` and `clear` do not fail: a broken medium is reported in the logs
/// and behaves like an empty store.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save(&self, session: &StoredSession) -> Result<(), StoreError>;

    async fn read(&self) -> Option<StoredSession>;

    /// Returns whether a record was removed.
    async fn clear(&self) -> bool;

    async fn token(&self) -> Option<String> {
        self.read().await.map(|session| session.token)
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<StoredSession>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: StoredSession) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        *self.slot.lock().await = Some(session.clone());
        Ok(())
    }

    async fn read(&self) -> Option<StoredSession> {
        self.slot.lock().await.clone()
    }

    async fn clear(&self) -> bool {
        self.slot.lock().await.take().is_some()
    }
}

#[derive(Clone)]
pub struct SqliteTokenStore {
    pool: Pool<Sqlite>,
}

impl SqliteTokenStore {
    pub async fn open(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid session database url '{database_url}'"))?
            .create_if_missing(true);
        // Every connection to `sqlite::memory:` is a separate database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open session database '{database_url}'"))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_credentials (
                slot      INTEGER PRIMARY KEY CHECK (slot = 1),
                token     TEXT NOT NULL,
                user_json TEXT NOT NULL,
                saved_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure session_credentials table exists")?;
        Ok(())
    }

    async fn try_read(&self) -> Result<Option<StoredSession>, StoreError> {
        let Some(row) =
            sqlx::query("SELECT token, user_json FROM session_credentials WHERE slot = 1")
                .fetch_optional(&self.pool)
                .await?
        else {
            return Ok(None);
        };
        let token: String = row.try_get("token")?;
        let user_json: String = row.try_get("user_json")?;
        let user = serde_json::from_str::<UserSummary>(&user_json)?;
        Ok(Some(StoredSession { token, user }))
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        let user_json = serde_json::to_string(&session.user)?;
        sqlx::query(
            "INSERT INTO session_credentials (slot, token, user_json, saved_at)
             VALUES (1, ?, ?, ?)
             ON CONFLICT(slot) DO UPDATE SET
                token = excluded.token,
                user_json = excluded.user_json,
                saved_at = excluded.saved_at",
        )
        .bind(&session.token)
        .bind(user_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        debug!("session credential persisted");
        Ok(())
    }

    async fn read(&self) -> Option<StoredSession> {
        match self.try_read().await {
            Ok(session) => session,
            Err(error) => {
                warn!(%error, "stored session unreadable; treating as signed out");
                None
            }
        }
    }

    async fn clear(&self) -> bool {
        match sqlx::query("DELETE FROM session_credentials WHERE slot = 1")
            .execute(&self.pool)
            .await
        {
            Ok(result) => result.rows_affected() > 0,
            Err(error) => {
                warn!(%error, "failed to clear stored session");
                false
            }
        }
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
