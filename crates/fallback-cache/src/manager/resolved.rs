//! Per-manager cache of constructed backends

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

use fallback_cache_core::CacheBackend;

use crate::guard::FailoverGuard;

/// Which backend a slot holds
///
/// Primary slots are keyed by failover episode, so a primary built before a
/// trip is never reused after the following reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
    Primary(u64),
    Fallback,
}

#[derive(Clone)]
pub(crate) enum Resolved {
    Guarded(Arc<FailoverGuard>),
    Direct(Arc<dyn CacheBackend>),
}

/// Constructed backends, built at most once per slot
///
/// Concurrent resolutions of an empty slot share one construction. A failed
/// construction leaves the slot empty for the next caller.
#[derive(Default)]
pub(crate) struct ResolvedBackends {
    slots: DashMap<Slot, Arc<OnceCell<Resolved>>>,
}

impl ResolvedBackends {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn get_or_try_init<F, Fut, E>(&self, slot: Slot, init: F) -> Result<Resolved, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Resolved, E>>,
    {
        // Clone the cell out so no map shard stays locked across the await.
        let cell = self.slots.entry(slot).or_default().clone();
        cell.get_or_try_init(init).await.cloned()
    }

    /// Drop every primary slot
    pub(crate) fn evict_primary(&self) {
        self.slots.retain(|slot, _| !matches!(slot, Slot::Primary(_)));
    }

    /// Drop primary slots left over from earlier episodes
    pub(crate) fn evict_stale_primary(&self, episode: u64) {
        self.slots
            .retain(|slot, _| !matches!(slot, Slot::Primary(e) if *e != episode));
    }

    pub(crate) fn clear(&self) {
        self.slots.clear();
    }

    /// Whether `slot` holds a constructed backend
    pub(crate) fn is_constructed(&self, slot: Slot) -> bool {
        self.slots
            .get(&slot)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use fallback_cache_core::CacheError;
    use fallback_cache_storage::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn direct() -> Resolved {
        Resolved::Direct(Arc::new(MemoryBackend::with_defaults()))
    }

    #[tokio::test]
    async fn test_slot_constructed_once() {
        let slots = ResolvedBackends::new();
        let builds = AtomicUsize::new(0);

        for _ in 0..3 {
            slots
                .get_or_try_init(Slot::Fallback, || async {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(direct())
                })
                .await
                .unwrap();
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(slots.is_constructed(Slot::Fallback));
    }

    #[tokio::test]
    async fn test_failed_construction_leaves_slot_empty() {
        let slots = ResolvedBackends::new();

        let result = slots
            .get_or_try_init(Slot::Primary(0), || async {
                Err::<Resolved, _>(CacheError::Timeout)
            })
            .await;
        assert!(result.is_err());
        assert!(!slots.is_constructed(Slot::Primary(0)));

        slots
            .get_or_try_init(Slot::Primary(0), || async { Ok::<_, CacheError>(direct()) })
            .await
            .unwrap();
        assert!(slots.is_constructed(Slot::Primary(0)));
    }

    #[tokio::test]
    async fn test_eviction_by_kind_and_episode() {
        let slots = ResolvedBackends::new();
        for slot in [Slot::Primary(0), Slot::Primary(1), Slot::Fallback] {
            slots
                .get_or_try_init(slot, || async { Ok::<_, CacheError>(direct()) })
                .await
                .unwrap();
        }

        slots.evict_stale_primary(1);
        assert!(!slots.is_constructed(Slot::Primary(0)));
        assert!(slots.is_constructed(Slot::Primary(1)));

        slots.evict_primary();
        assert!(!slots.is_constructed(Slot::Primary(1)));
        assert!(slots.is_constructed(Slot::Fallback));

        slots.clear();
        assert!(!slots.is_constructed(Slot::Fallback));
    }
}
