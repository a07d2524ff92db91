//! Cache store used as a lookahead in front of queries and chart rendering
//!
//! Connectivity failures never reach the caller: they are logged and the
//! read or write is reported as a miss or a failed write.

use crate::{config::RedisConfig, error::AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the stored payload, or `None` on a miss or a transport failure.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores a payload with a TTL. Returns `false` if the write did not happen.
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> bool;

    /// Connectivity probe for readiness checks.
    async fn health_check(&self) -> Result<()>;

    /// Backend label used in metrics.
    fn backend(&self) -> &'static str;
}

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REDIS_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ConnectionSlot {
    connection: Option<MultiplexedConnection>,
    last_attempt: Option<Instant>,
}

/// Redis-backed store. Starts even when Redis is down and reconnects lazily,
/// at most once every five seconds.
#[derive(Clone)]
pub struct RedisCache {
    client: Client,
    slot: Arc<tokio::sync::Mutex<ConnectionSlot>>,
}

impl RedisCache {
    /// Fails only on an unusable URL. An unreachable server leaves the cache
    /// in degraded mode: every read misses and every write is dropped.
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        info!("Initializing Redis cache connection");

        let client = Client::open(config.url.as_str())
            .map_err(|e| AppError::configuration(format!("Failed to create Redis client: {}", e)))?;

        let cache = Self {
            client,
            slot: Arc::new(tokio::sync::Mutex::new(ConnectionSlot::default())),
        };

        match cache.connection().await {
            Ok(_) => info!("Redis cache connection initialized successfully"),
            Err(e) => warn!("Redis unreachable at startup, cache degraded: {}", e),
        }

        Ok(cache)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.slot.lock().await;
        if let Some(connection) = &slot.connection {
            return Ok(connection.clone());
        }

        if let Some(last) = slot.last_attempt {
            if last.elapsed() < REDIS_RECONNECT_INTERVAL {
                return Err(AppError::service_unavailable("redis cache (waiting to reconnect)"));
            }
        }
        slot.last_attempt = Some(Instant::now());

        let connection = match tokio::time::timeout(
            REDIS_CONNECT_TIMEOUT,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        {
            Ok(connection) => connection?,
            Err(_) => return Err(AppError::timeout("redis connect")),
        };
        debug!("Redis cache connected");
        slot.connection = Some(connection.clone());
        Ok(connection)
    }

    /// Drops the shared connection so the next call reconnects.
    async fn reset(&self) {
        self.slot.lock().await.connection = None;
    }

    async fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.reset().await;
                Err(e.into())
            }
        }
    }

    async fn try_set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<()> {
        let mut conn = self.connection().await?;
        if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await {
            self.reset().await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                error!(key = %key, "Error reading from Redis, treating as miss: {}", e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> bool {
        match self.try_set(key, value, ttl_seconds).await {
            Ok(()) => true,
            Err(e) => {
                error!(key = %key, "Error writing to Redis: {}", e);
                false
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        if let Err(e) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            self.reset().await;
            return Err(e.into());
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process cache with the same TTL semantics as Redis.
///
/// Suitable for a single gateway instance and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
        }
        removed
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        // Lazy expiry; the guard above is released before removal.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> bool {
        let entry = MemoryEntry {
            value: value.to_vec(),
            expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
        };
        self.entries.insert(key.to_string(), entry);
        true
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
