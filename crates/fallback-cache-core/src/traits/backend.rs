//! Cache backend trait

use async_trait::async_trait;
use std::time::Duration;

use crate::CacheError;

/// Capability every cache store exposes to the failover engine
///
/// Implementations include the in-memory map, the file store, the SQLite
/// table store and the Redis client. The engine never needs more than these
/// operations, so primary and fallback are interchangeable behind
/// `Arc<dyn CacheBackend>`.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Get a value from the cache
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value
    ///
    /// `ttl = None` stores the value without expiry. Returns `true` if the
    /// value was written.
    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;

    /// Remove a key from the cache
    ///
    /// Returns `true` if the key existed and was removed.
    async fn forget(&self, key: &str) -> Result<bool, CacheError>;

    /// Connectivity probe run right after construction
    ///
    /// Local stores have nothing to check.
    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[async_trait]
impl<B: CacheBackend + ?Sized> CacheBackend for std::sync::Arc<B> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        (**self).put(key, value, ttl).await
    }

    async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        (**self).forget(key).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        (**self).ping().await
    }
}
