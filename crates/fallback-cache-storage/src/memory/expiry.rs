//! Deadline index for expiring memory entries

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

/// Keys ordered by expiry deadline
///
/// Lets cleanup visit only the keys that are due instead of scanning the
/// whole map.
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    deadlines: BTreeMap<Instant, HashSet<String>>,
    by_key: HashMap<String, Instant>,
}

impl ExpiryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` to expire `ttl` from now, replacing any earlier deadline
    ///
    /// A deadline past what `Instant` can represent is never due, so the key
    /// is left unscheduled.
    pub fn schedule(&mut self, key: String, ttl: Duration) {
        self.remove(&key);
        let Some(deadline) = Instant::now().checked_add(ttl) else {
            return;
        };
        self.deadlines
            .entry(deadline)
            .or_default()
            .insert(key.clone());
        self.by_key.insert(key, deadline);
    }

    /// Remove a key from the index
    pub fn remove(&mut self, key: &str) {
        if let Some(deadline) = self.by_key.remove(key) {
            if let Some(keys) = self.deadlines.get_mut(&deadline) {
                keys.remove(key);
                if keys.is_empty() {
                    self.deadlines.remove(&deadline);
                }
            }
        }
    }

    /// Take every key whose deadline is at or before `now`
    pub fn drain_due(&mut self, now: Instant) -> Vec<String> {
        let pending = self.deadlines.split_off(&now);
        let due = std::mem::replace(&mut self.deadlines, pending);

        // split_off keeps `now` itself in the pending half
        let mut expired: Vec<String> = due.into_values().flatten().collect();
        if let Some(keys) = self.deadlines.remove(&now) {
            expired.extend(keys);
        }
        for key in &expired {
            self.by_key.remove(key);
        }
        expired
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
        self.by_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_and_remove() {
        let mut index = ExpiryIndex::new();
        index.schedule("key1".to_string(), Duration::from_secs(10));
        assert!(index.contains("key1"));

        index.remove("key1");
        assert!(!index.contains("key1"));
        assert!(index.is_empty());
    }

    #[test]
    fn test_unrepresentable_deadline_is_not_scheduled() {
        let mut index = ExpiryIndex::new();
        index.schedule("key1".to_string(), Duration::from_secs(10));
        index.schedule("key1".to_string(), Duration::MAX);
        assert!(!index.contains("key1"));
        assert!(index.is_empty());
    }

    #[test]
    fn test_reschedule_keeps_one_deadline() {
        let mut index = ExpiryIndex::new();
        index.schedule("key1".to_string(), Duration::from_secs(10));
        index.schedule("key1".to_string(), Duration::from_secs(20));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_drain_due() {
        let mut index = ExpiryIndex::new();
        index.schedule("soon".to_string(), Duration::ZERO);
        index.schedule("later".to_string(), Duration::from_secs(3600));

        let expired = index.drain_due(Instant::now() + Duration::from_millis(1));
        assert_eq!(expired, vec!["soon".to_string()]);
        assert!(index.contains("later"));
        assert_eq!(index.len(), 1);
    }
}
