//! Server-side session records.
//!
//! The backend is a plain key/value store with per-key TTL: redis in production,
//! an in-process map otherwise. Every operation touches a single key, so the
//! atomicity redis gives per command is all the session layer relies on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::user::Role;

const SESSION_PREFIX: &str = "session:";
const REVOKED_PREFIX: &str = "revoked:";

#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError>;
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// Redis-backed sessions (`SET key value EX ttl`).
#[derive(Clone)]
pub struct RedisSessionBackend {
    conn: MultiplexedConnection,
}

impl RedisSessionBackend {
    pub async fn connect(client: &redis::Client) -> anyhow::Result<Self> {
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn })
    }
}

fn redis_error(err: redis::RedisError) -> AppError {
    AppError::Internal(anyhow::Error::new(err).context("session backend"))
}

#[async_trait]
impl SessionBackend for RedisSessionBackend {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(redis_error)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key).await.map_err(redis_error)
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(redis_error)
    }
}

/// In-process sessions. Expired entries are dropped lazily on access and on every write.
#[derive(Clone, Default)]
pub struct MemorySessionBackend {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBackend for MemorySessionBackend {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// What the server remembers about a session id.
///
/// `user_id == None` is an anonymous pre-session: it exists only so the login
/// request itself can carry a CSRF token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: Option<i64>,
    pub role: Option<Role>,
    pub csrf_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Typed access to the backend: session records plus the revoked-token list.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self { backend }
    }

    pub async fn create(&self, record: &SessionRecord) -> Result<String, AppError> {
        let id = crate::auth::csrf::random_token();
        let ttl = (record.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        let value = serde_json::to_string(record).map_err(anyhow::Error::from)?;
        self.backend
            .put(&format!("{SESSION_PREFIX}{id}"), value, ttl)
            .await?;
        Ok(id)
    }

    /// Returns the record if it exists and has not expired. A record that fails to
    /// parse is treated as absent.
    pub async fn load(&self, id: &str) -> Result<Option<SessionRecord>, AppError> {
        let Some(raw) = self.backend.get(&format!("{SESSION_PREFIX}{id}")).await? else {
            return Ok(None);
        };
        let record = match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Discarding unreadable session record: {e}");
                return Ok(None);
            }
        };
        if record.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(record))
    }

    pub async fn destroy(&self, id: &str) -> Result<(), AppError> {
        self.backend.remove(&format!("{SESSION_PREFIX}{id}")).await
    }

    /// Remembers a token id as revoked until the token would have expired anyway.
    pub async fn revoke_token(&self, jti: &str, expires_at: i64) -> Result<(), AppError> {
        let remaining = expires_at - Utc::now().timestamp();
        if remaining <= 0 {
            return Ok(());
        }
        self.backend
            .put(
                &format!("{REVOKED_PREFIX}{jti}"),
                "1".to_string(),
                Duration::from_secs(remaining as u64),
            )
            .await
    }

    pub async fn is_token_revoked(&self, jti: &str) -> Result<bool, AppError> {
        Ok(self
            .backend
            .get(&format!("{REVOKED_PREFIX}{jti}"))
            .await?
            .is_some())
    }
}
