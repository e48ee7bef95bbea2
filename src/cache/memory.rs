//! In-process TTL cache.

use super::MetadataCache;
use crate::error::ConnectorResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Map-backed cache. Expired entries are dropped when read or cleared.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl MemoryCache {
    /// `default_ttl` applies to entries written with a zero TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MetadataCache for MemoryCache {
    async fn get(&self, key: &str) -> ConnectorResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> ConnectorResult<()> {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn clear(&self, prefix: Option<&str>) -> ConnectorResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let mut expired = 0;
        entries.retain(|key, entry| {
            let matches = prefix.is_none_or(|p| key.starts_with(p));
            if !matches && entry.expires_at <= now {
                expired += 1;
                return false;
            }
            !matches
        });
        Ok(before - entries.len() - expired)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
