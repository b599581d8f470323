//! src/services/rate_limit.rs
//!
//! Per-client submission throttle over a narrow key-value store. Values are
//! opaque strings (epoch milliseconds of the last successful submission);
//! the store itself knows nothing about the window policy.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::warn;

/// Minimum gap between successful submissions from the same client key.
pub const SUBMIT_WINDOW_MS: i64 = 60_000;

/// Narrow key-value seam so the limiter can run against SQLite in
/// production and an in-memory map in tests.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;
    /// Cheap connectivity probe for the readiness endpoint.
    async fn ping(&self) -> anyhow::Result<()>;
}

/// SQLite-backed store: one row per client key, superseded on each
/// successful submission.
#[derive(Clone)]
pub struct SqliteRateLimitStore {
    db: Arc<SqlitePool>,
}

impl SqliteRateLimitStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RateLimitStore for SqliteRateLimitStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT last_submission_ms FROM rate_limits WHERE client_key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO rate_limits (client_key, last_submission_ms) VALUES (?, ?)
             ON CONFLICT(client_key) DO UPDATE SET last_submission_ms = excluded.last_submission_ms",
        )
        .bind(key)
        .bind(value)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

/// Window policy over a [`RateLimitStore`].
///
/// There is no locking across the check/record pair: two requests from the
/// same key inside the same instant can both pass the check. Accepted — the
/// window exists to deter floods, not to serialize clients.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RateLimitStore> {
        &self.store
    }

    /// Returns true when the client is allowed to submit at `now_ms`.
    ///
    /// A stored value that does not parse as an integer is treated as
    /// absent; the store contract is opaque strings, so garbage must not
    /// lock a client out forever.
    pub async fn check(&self, key: &str, now_ms: i64) -> anyhow::Result<bool> {
        let last = match self.store.get(key).await? {
            Some(raw) => match raw.parse::<i64>() {
                Ok(ms) => Some(ms),
                Err(_) => {
                    warn!(key, value = %raw, "discarding unparsable rate-limit value");
                    None
                }
            },
            None => None,
        };
        Ok(match last {
            Some(last_ms) => now_ms - last_ms >= SUBMIT_WINDOW_MS,
            None => true,
        })
    }

    /// Record a successful submission. Called only after the whole
    /// transaction has landed, so failed attempts do not consume the window.
    pub async fn record(&self, key: &str, now_ms: i64) -> anyhow::Result<()> {
        self.store.put(key, &now_ms.to_string()).await
    }
}
