use async_trait::async_trait;
use bb8::{Pool, PooledConnection, RunError};
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use fallback_cache_core::{CacheBackend, CacheError, Result};

use super::config::RedisConfig;

/// Redis backend implementation
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool<RedisConnectionManager>,
    config: RedisConfig,
}

impl RedisBackend {
    /// Create the pool and probe the server
    ///
    /// The probe (`PING`) is bounded by `connection_timeout`, so an
    /// unreachable server fails here instead of on the first real call.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let backend = Self::new(config).await?;
        backend.ping().await?;
        Ok(backend)
    }

    /// Create the pool without probing
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|e| CacheError::Configuration(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        Ok(Self { pool, config })
    }

    /// Get prefix for a key
    fn prefixed_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Get connection from pool
    async fn get_connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        self.pool.get().await.map_err(|e| match e {
            RunError::TimedOut => CacheError::Timeout,
            RunError::User(e) => CacheError::Connection(e.to_string()),
        })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        conn.get(self.prefixed_key(key))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let prefixed = self.prefixed_key(key);

        match ttl {
            // SETEX rejects 0, so round sub-second TTLs up
            Some(ttl) => conn
                .set_ex::<_, _, ()>(&prefixed, value, ttl.as_secs().max(1))
                .await,
            None => conn.set::<_, _, ()>(&prefixed, value).await,
        }
        .map_err(|e| CacheError::Backend(e.to_string()))?;

        Ok(true)
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let deleted: u64 = conn
            .del(self.prefixed_key(key))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<()> {
        let probe = async {
            let mut conn = self.get_connection().await?;
            redis::cmd("PING")
                .query_async::<String>(&mut *conn)
                .await
                .map_err(|e| CacheError::Connection(e.to_string()))
        };

        match tokio::time::timeout(self.config.connection_timeout, probe).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}
