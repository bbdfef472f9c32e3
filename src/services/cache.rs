use moka::Expiry;
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::models::Identity;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache miss: {0}")]
    CacheMiss(String),
}

/// L1 entry: the JSON payload plus the lifetime it was written with
#[derive(Clone)]
struct Entry {
    json: Arc<str>,
    ttl: Duration,
}

/// Expires each L1 entry after its own TTL, capped at the manager maximum
struct EntryExpiry {
    max_ttl: Duration,
}

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl.min(self.max_ttl))
    }
}

/// Two-tier lookup cache: a process-local moka cache in front of Redis.
///
/// Every write carries its own TTL so that negative lookups can expire
/// sooner than positive ones. Redis holds the entry for exactly that TTL;
/// the local tier never keeps it longer than `max_ttl`.
pub struct CacheManager {
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    local: moka::future::Cache<String, Entry>,
}

impl CacheManager {
    pub async fn new(redis_url: &str, l1_size: u64, max_ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        let local = moka::future::Cache::builder()
            .max_capacity(l1_size)
            .expire_after(EntryExpiry {
                max_ttl: Duration::from_secs(max_ttl_secs.max(1)),
            })
            .build();

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            local,
        })
    }

    /// Read a value, local tier first. A Redis hit is copied into the local
    /// tier with the TTL Redis still reports for it.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, CacheError> {
        if let Some(entry) = self.local.get(key).await {
            tracing::trace!("Local cache hit: {}", key);
            return Ok(serde_json::from_str(&entry.json)?);
        }

        let mut conn = self.redis.lock().await;
        let (value, remaining): (Option<String>, i64) = redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("TTL")
            .arg(key)
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        let Some(json) = value else {
            tracing::trace!("Cache miss: {}", key);
            return Err(CacheError::CacheMiss(key.to_string()));
        };

        tracing::trace!("Redis cache hit: {} ({}s left)", key, remaining);
        let parsed = serde_json::from_str(&json)?;
        if remaining > 0 {
            self.local
                .insert(
                    key.to_string(),
                    Entry {
                        json: json.into(),
                        ttl: Duration::from_secs(remaining as u64),
                    },
                )
                .await;
        }
        Ok(parsed)
    }

    /// Write a value to both tiers for `ttl_secs` seconds
    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<(), CacheError> {
        let ttl_secs = ttl_secs.max(1);
        let json = serde_json::to_string(value)?;

        let mut conn = self.redis.lock().await;
        redis::cmd("SET")
            .arg(key)
            .arg(&json)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<()>(&mut *conn)
            .await?;
        drop(conn);

        self.local
            .insert(
                key.to_string(),
                Entry {
                    json: json.into(),
                    ttl: Duration::from_secs(ttl_secs),
                },
            )
            .await;

        tracing::trace!("Cache set: {} (ttl {}s)", key, ttl_secs);
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.local.invalidate(key).await;
        let mut conn = self.redis.lock().await;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    const NAMESPACE: &'static str = "matchbrew";

    /// Latest-profile lookup for one identity
    pub fn profile(who: &Identity) -> String {
        format!("{}:profile:{}:{}", Self::NAMESPACE, who.platform, who.username)
    }
}
