//! Redis-backed cache shared between server instances.

use super::MetadataCache;
use crate::error::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::info;

/// Redis cache over a multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(url: &str) -> ConnectorResult<Self> {
        let client = Client::open(url)
            .map_err(|e| ConnectorError::cache(format!("invalid Redis URL: {e}")))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| ConnectorError::cache(format!("cannot connect to Redis: {e}")))?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        info!(response = %pong, "Connected to Redis cache");
        Ok(Self { conn })
    }
}

fn redis_error(err: redis::RedisError) -> ConnectorError {
    ConnectorError::cache(format!("Redis error: {err}"))
}

#[async_trait]
impl MetadataCache for RedisCache {
    async fn get(&self, key: &str) -> ConnectorResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(redis_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> ConnectorResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    async fn clear(&self, prefix: Option<&str>) -> ConnectorResult<usize> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", prefix.unwrap_or_default());
        let keys: Vec<String> = conn.keys(&pattern).await.map_err(redis_error)?;
        if keys.is_empty() {
            return Ok(0);
        }
        let _: () = conn.del(&keys).await.map_err(redis_error)?;
        Ok(keys.len())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
