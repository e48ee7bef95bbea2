//! Metadata cache collaborator.
//!
//! Service reads go through [`CacheLayer::read_through`]. Values are stored as
//! JSON under `metadata:{database}:{operation}:{args...}` keys. A cache that
//! fails is treated as a miss: errors are logged and the live result is
//! returned.

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;

use crate::config::{CacheBackend, CacheConfig};
use crate::error::ConnectorResult;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "metadata";

/// TTL for database overviews.
pub const OVERVIEW_TTL: Duration = Duration::from_secs(300);
/// TTL for table and procedure details.
pub const DETAILS_TTL: Duration = Duration::from_secs(600);

/// A string key-value store with per-entry expiry.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&self, key: &str) -> ConnectorResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> ConnectorResult<()>;

    /// Remove entries whose key starts with `prefix` (all entries when
    /// `None`) and return how many were removed.
    async fn clear(&self, prefix: Option<&str>) -> ConnectorResult<usize>;

    fn name(&self) -> &'static str;
}

/// `metadata:{database}:{operation}:{args...}`
pub fn cache_key(database: &str, operation: &str, args: &[&str]) -> String {
    let mut key = format!("{KEY_PREFIX}:{database}:{operation}");
    for arg in args {
        key.push(':');
        key.push_str(arg);
    }
    key
}

/// Optional cache backend wrapped with miss-on-error semantics.
#[derive(Clone, Default)]
pub struct CacheLayer {
    backend: Option<Arc<dyn MetadataCache>>,
}

impl CacheLayer {
    /// A layer that never stores anything.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn new(backend: Arc<dyn MetadataCache>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Build the configured backend. An unreachable Redis falls back to the
    /// in-memory cache so the server still starts.
    pub async fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("Metadata cache disabled");
            return Self::disabled();
        }
        let default_ttl = Duration::from_secs(config.ttl_seconds);
        match config.backend {
            CacheBackend::Memory => Self::new(Arc::new(MemoryCache::new(default_ttl))),
            #[cfg(feature = "redis-cache")]
            CacheBackend::Redis => match RedisCache::connect(&config.redis_url).await {
                Ok(cache) => Self::new(Arc::new(cache)),
                Err(e) => {
                    warn!(error = %e, "Redis cache unavailable, using in-memory cache");
                    Self::new(Arc::new(MemoryCache::new(default_ttl)))
                }
            },
            #[cfg(not(feature = "redis-cache"))]
            CacheBackend::Redis => {
                warn!("Built without the `redis-cache` feature, using in-memory cache");
                Self::new(Arc::new(MemoryCache::new(default_ttl)))
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("disabled", |b| b.name())
    }

    /// Return the cached value for `key`, or run `op`, store its result for
    /// `ttl` and return it. Errors from `op` are returned and never cached.
    pub async fn read_through<T, F, Fut>(&self, key: &str, ttl: Duration, op: F) -> ConnectorResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConnectorResult<T>>,
    {
        let Some(backend) = &self.backend else {
            return op().await;
        };

        match backend.get(key).await {
            Ok(Some(text)) => match serde_json::from_str::<T>(&text) {
                Ok(value) => {
                    debug!(key = key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => warn!(key = key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => debug!(key = key, "Cache miss"),
            Err(e) => warn!(key = key, error = %e, "Cache read failed"),
        }

        let value = op().await?;
        match serde_json::to_string(&value) {
            Ok(text) => {
                if let Err(e) = backend.set(key, &text, ttl).await {
                    warn!(key = key, error = %e, "Cache write failed");
                }
            }
            Err(e) => warn!(key = key, error = %e, "Cannot serialize value for cache"),
        }
        Ok(value)
    }

    /// Drop cached entries of one database, or of all databases.
    pub async fn clear(&self, database: Option<&str>) -> usize {
        let Some(backend) = &self.backend else {
            return 0;
        };
        let prefix = match database {
            Some(db) => format!("{KEY_PREFIX}:{db}:"),
            None => format!("{KEY_PREFIX}:"),
        };
        match backend.clear(Some(&prefix)).await {
            Ok(removed) => {
                info!(prefix = %prefix, removed, "Cleared metadata cache");
                removed
            }
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "Cache clear failed");
                0
            }
        }
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("backend", &self.backend_name())
            .finish()
    }
}
