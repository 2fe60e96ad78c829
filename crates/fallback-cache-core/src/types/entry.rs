//! Stored entry type

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A stored payload with its expiry metadata
///
/// Drivers that persist entries themselves (memory, file) keep this wrapper
/// next to the raw bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached payload
    pub value: Vec<u8>,
    /// When the entry was written
    pub created_at: SystemTime,
    /// Time-to-live; `None` never expires
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    /// Create an entry that never expires
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            value,
            created_at: SystemTime::now(),
            ttl: None,
        }
    }

    /// Create an entry with an optional TTL
    pub fn with_ttl(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            ..Self::new(value)
        }
    }

    /// Check if entry has expired
    pub fn is_expired(&self) -> bool {
        match (self.ttl, self.created_at.elapsed()) {
            (Some(ttl), Ok(elapsed)) => elapsed >= ttl,
            _ => false,
        }
    }

    /// Get remaining TTL
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.ttl.and_then(|ttl| {
            self.created_at
                .elapsed()
                .ok()
                .and_then(|elapsed| ttl.checked_sub(elapsed))
        })
    }

    /// Absolute expiry as seconds since the Unix epoch
    pub fn expires_at_unix(&self) -> Option<u64> {
        let ttl = self.ttl?;
        let created = self.created_at.duration_since(UNIX_EPOCH).ok()?;
        created.checked_add(ttl).map(|at| at.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let entry = CacheEntry::new(b"v".to_vec());
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining().is_none());
        assert!(entry.expires_at_unix().is_none());
    }

    #[test]
    fn test_entry_with_ttl() {
        let entry = CacheEntry::with_ttl(b"v".to_vec(), Some(Duration::from_secs(60)));
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining().unwrap() <= Duration::from_secs(60));
    }

    #[test]
    fn test_entry_expired() {
        let entry = CacheEntry {
            value: b"v".to_vec(),
            created_at: SystemTime::now() - Duration::from_secs(120),
            ttl: Some(Duration::from_secs(60)),
        };
        assert!(entry.is_expired());
        assert!(entry.ttl_remaining().is_none());
    }
}
