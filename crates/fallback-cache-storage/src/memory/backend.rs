//! In-memory cache backend using DashMap

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fallback_cache_core::{CacheBackend, CacheEntry, CacheStats, Result};

use super::expiry::ExpiryIndex;

/// Configuration for the memory backend
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of entries (0 = unlimited)
    pub max_capacity: usize,
    /// Track deadlines so `cleanup_expired` doesn't scan the whole map
    pub enable_expiry_index: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            enable_expiry_index: true,
        }
    }
}

impl MemoryConfig {
    /// Create config with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            max_capacity: capacity,
            ..Default::default()
        }
    }

    /// Create config with unlimited capacity
    pub fn unlimited() -> Self {
        Self {
            max_capacity: 0,
            ..Default::default()
        }
    }
}

/// In-memory cache backend
///
/// Cloning creates a new handle to the SAME underlying map; two backends
/// built with `new` never share entries.
#[derive(Clone)]
pub struct MemoryBackend {
    data: Arc<DashMap<String, CacheEntry>>,
    expiry: Arc<RwLock<ExpiryIndex>>,
    stats: Arc<RwLock<CacheStats>>,
    config: MemoryConfig,
}

impl MemoryBackend {
    /// Create a new memory backend
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(config.max_capacity.min(10_000))),
            expiry: Arc::new(RwLock::new(ExpiryIndex::new())),
            stats: Arc::new(RwLock::new(CacheStats::default())),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    /// Make room for one more entry
    fn maybe_evict(&self, incoming: &str) {
        let capacity = self.config.max_capacity;
        if capacity == 0 || self.data.len() < capacity || self.data.contains_key(incoming) {
            return;
        }

        self.cleanup_expired();
        let overflow = (self.data.len() + 1).saturating_sub(capacity);
        let victims: Vec<String> = self
            .data
            .iter()
            .take(overflow)
            .map(|entry| entry.key().clone())
            .collect();

        for key in victims {
            self.remove_entry(&key);
            self.stats.write().evictions += 1;
        }
    }

    fn remove_entry(&self, key: &str) -> bool {
        self.expiry.write().remove(key);
        self.data.remove(key).is_some()
    }

    /// Drop expired entries and return how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let due = self.expiry.write().drain_due(Instant::now());
        let mut removed = 0;

        for key in due {
            if self.data.remove_if(&key, |_, entry| entry.is_expired()).is_some() {
                removed += 1;
            }
        }

        self.stats.write().evictions += removed as u64;
        removed
    }

    /// Snapshot of the backend counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.data.len(),
            ..self.stats.read().clone()
        }
    }

    /// Number of stored entries, expired ones included until cleanup
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.data.clear();
        self.expiry.write().clear();
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let hit = match self.data.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(entry) => {
                drop(entry);
                // A put may have replaced the entry since the read
                if self.data.remove_if(key, |_, entry| entry.is_expired()).is_some() {
                    self.expiry.write().remove(key);
                }
                None
            }
            None => None,
        };

        let mut stats = self.stats.write();
        match hit {
            Some(_) => stats.hits += 1,
            None => stats.misses += 1,
        }
        Ok(hit)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        self.maybe_evict(key);

        if self.config.enable_expiry_index {
            let mut expiry = self.expiry.write();
            match ttl {
                Some(ttl) => expiry.schedule(key.to_string(), ttl),
                None => expiry.remove(key),
            }
        }

        self.data
            .insert(key.to_string(), CacheEntry::with_ttl(value, ttl));
        self.stats.write().writes += 1;
        Ok(true)
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        let removed = self.remove_entry(key);
        if removed {
            self.stats.write().deletes += 1;
        }
        Ok(removed)
    }
}
