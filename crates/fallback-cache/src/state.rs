//! Shared failover flag

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Process-wide "primary is down" flag
///
/// Shared by `Arc` between every manager and guard that should fail over
/// together. The flag flips to `true` at most once per unhealthy episode
/// ([`trip`](Self::trip) is a compare-and-swap with a single winner) and only
/// goes back to `false` through [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct FailoverState {
    failed_over: AtomicBool,
    episode: AtomicU64,
    failed_from: RwLock<Option<String>>,
}

impl FailoverState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether traffic is currently routed to the fallback
    #[inline]
    pub fn get(&self) -> bool {
        self.failed_over.load(Ordering::Acquire)
    }

    /// Set the flag directly
    ///
    /// `set(true)` behaves like an anonymous [`trip`](Self::trip) and
    /// `set(false)` like [`reset`](Self::reset).
    pub fn set(&self, failed_over: bool) {
        if failed_over {
            self.trip_from(None);
        } else {
            self.reset();
        }
    }

    /// Mark `from_store` as failed
    ///
    /// Returns `true` for exactly one caller per episode. Everyone else
    /// gets `false` and must not repeat the side effects of a transition.
    pub fn trip(&self, from_store: &str) -> bool {
        self.trip_from(Some(from_store))
    }

    fn trip_from(&self, from_store: Option<&str>) -> bool {
        let won = self
            .failed_over
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.episode.fetch_add(1, Ordering::AcqRel);
            *self.failed_from.write() = from_store.map(str::to_string);
        }
        won
    }

    /// Clear the flag; returns whether it was set
    pub fn reset(&self) -> bool {
        let was_set = self.failed_over.swap(false, Ordering::AcqRel);
        if was_set {
            *self.failed_from.write() = None;
        }
        was_set
    }

    /// Store the current episode failed away from, if known
    pub fn failed_from(&self) -> Option<String> {
        self.failed_from.read().clone()
    }

    /// Number of transitions so far
    #[inline]
    pub fn episode(&self) -> u64 {
        self.episode.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_healthy() {
        let state = FailoverState::new();
        assert!(!state.get());
        assert_eq!(state.episode(), 0);
        assert_eq!(state.failed_from(), None);
    }

    #[test]
    fn test_trip_has_single_winner() {
        let state = FailoverState::new();
        assert!(state.trip("redis"));
        assert!(!state.trip("redis"));
        assert!(state.get());
        assert_eq!(state.episode(), 1);
        assert_eq!(state.failed_from().as_deref(), Some("redis"));
    }

    #[test]
    fn test_reset_starts_new_episode() {
        let state = FailoverState::new();
        assert!(!state.reset());

        state.trip("redis");
        assert!(state.reset());
        assert!(!state.get());
        assert_eq!(state.failed_from(), None);

        assert!(state.trip("redis"));
        assert_eq!(state.episode(), 2);
    }

    #[test]
    fn test_set_maps_to_trip_and_reset() {
        let state = FailoverState::new();
        state.set(true);
        assert!(state.get());
        assert_eq!(state.failed_from(), None);
        state.set(true);
        assert_eq!(state.episode(), 1);
        state.set(false);
        assert!(!state.get());
    }

    #[test]
    fn test_concurrent_trips_one_winner() {
        let state = Arc::new(FailoverState::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.trip("redis"))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(state.episode(), 1);
    }
}
