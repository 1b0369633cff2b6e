use super::{CacheError, CacheResult};
use crate::config::CacheConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::Arc;
use std::time::Duration;

/// Shared key-value tier behind the in-process cache.
///
/// Values are opaque serialized payloads; keys are given without any
/// deployment prefix, which implementations add themselves.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_with_ttl(&self, key: &str, payload: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete every key starting with `prefix`, returning how many were removed
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<usize>;

    /// Round-trip check; establishes the connection if needed
    async fn ping(&self) -> CacheResult<()>;
}

const SCAN_BATCH: usize = 200;

/// Redis remote tier.
///
/// The connection is opened on first use, so constructing a tier never
/// touches the network. `ConnectionManager` reconnects on its own once
/// established.
pub struct RedisTier {
    client: Client,
    connection: RwLock<Option<ConnectionManager>>,
    key_prefix: String,
}

impl RedisTier {
    pub fn new(redis_url: &str, key_prefix: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            AppError::Configuration(format!("Invalid Redis URL '{}': {}", redis_url, e))
        })?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            key_prefix: key_prefix.to_string(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    async fn connection(&self) -> CacheResult<ConnectionManager> {
        let existing = self.connection.read().clone();
        if let Some(conn) = existing {
            return Ok(conn);
        }

        let conn = ConnectionManager::new(self.client.clone()).await?;
        tracing::info!(prefix = %self.key_prefix, "Connected to Redis cache tier");
        *self.connection.write() = Some(conn.clone());
        Ok(conn)
    }
}

/// Escape glob metacharacters for use in a SCAN MATCH pattern
fn escape_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl RemoteTier for RedisTier {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection().await?;
        let payload = redis::cmd("GET")
            .arg(self.full_key(key))
            .query_async::<_, Option<String>>(&mut conn)
            .await?;
        Ok(payload)
    }

    async fn set_with_ttl(&self, key: &str, payload: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let ttl_ms = ttl.as_millis().max(1) as u64;
        redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(payload)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("DEL")
            .arg(self.full_key(key))
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", escape_pattern(&self.full_key(prefix)));
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async::<_, i64>(&mut conn)
                    .await?;
                removed += deleted.max(0) as usize;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let reply = redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        if reply != "PONG" {
            return Err(CacheError::Remote(format!("unexpected PING reply: {}", reply)));
        }
        Ok(())
    }
}

/// Build the configured remote tier, if any
pub fn build_remote_tier(config: &CacheConfig) -> Result<Option<Arc<dyn RemoteTier>>> {
    if !config.remote_enabled {
        return Ok(None);
    }

    let url = config.redis_url.as_deref().ok_or_else(|| {
        AppError::Configuration("cache.remote_enabled requires cache.redis_url".to_string())
    })?;

    let tier = RedisTier::new(url, &config.key_prefix)?;
    Ok(Some(Arc::new(tier)))
}
