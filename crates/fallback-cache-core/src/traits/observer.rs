//! Observer hooks for failover telemetry

use std::sync::Arc;

use crate::CacheError;

/// Lifecycle events of the failover engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailoverEventKind {
    /// Traffic switched from the primary to the fallback
    Failover,
    /// An operator reset the failover state
    Recovery,
    /// Primary and fallback resolve to the same store
    Misconfigured,
    /// The fallback itself failed while serving a request
    FallbackError,
}

impl FailoverEventKind {
    /// Get event kind as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverEventKind::Failover => "failover",
            FailoverEventKind::Recovery => "recovery",
            FailoverEventKind::Misconfigured => "misconfigured",
            FailoverEventKind::FallbackError => "fallback_error",
        }
    }
}

/// Trait for failover observability
///
/// The engine guarantees `on_failover` fires once per unhealthy episode, no
/// matter how many callers observed the primary failing. Implement this to
/// forward events to your logging or metrics system.
pub trait FailoverObserver: Send + Sync + 'static {
    /// Traffic was switched away from `from_store`
    fn on_failover(&self, from_store: &str, to_store: &str, error: &CacheError);

    /// Failover state was cleared; `store` is targeted again
    fn on_recovery(&self, store: &str);

    /// Primary and fallback are the same store, so failover is disabled
    fn on_misconfigured(&self, store: &str, error: Option<&CacheError>);

    /// The fallback failed while serving a request
    fn on_fallback_error(&self, store: &str, error: &CacheError);
}

impl<O: FailoverObserver + ?Sized> FailoverObserver for Arc<O> {
    fn on_failover(&self, from_store: &str, to_store: &str, error: &CacheError) {
        (**self).on_failover(from_store, to_store, error)
    }

    fn on_recovery(&self, store: &str) {
        (**self).on_recovery(store)
    }

    fn on_misconfigured(&self, store: &str, error: Option<&CacheError>) {
        (**self).on_misconfigured(store, error)
    }

    fn on_fallback_error(&self, store: &str, error: &CacheError) {
        (**self).on_fallback_error(store, error)
    }
}

/// No-op observer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl FailoverObserver for NoopObserver {
    #[inline]
    fn on_failover(&self, _from_store: &str, _to_store: &str, _error: &CacheError) {}

    #[inline]
    fn on_recovery(&self, _store: &str) {}

    #[inline]
    fn on_misconfigured(&self, _store: &str, _error: Option<&CacheError>) {}

    #[inline]
    fn on_fallback_error(&self, _store: &str, _error: &CacheError) {}
}

/// Observer using the `metrics` crate
///
/// # Example
/// ```ignore
/// use fallback_cache_core::MetricsObserver;
///
/// // Install a recorder first (e.g. a Prometheus exporter)
/// let observer = MetricsObserver::new("fallback_cache");
/// // Emits: fallback_cache_failovers_total{from, to}, fallback_cache_recoveries_total, ...
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsObserver {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsObserver {
    /// Create a new observer with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl FailoverObserver for MetricsObserver {
    fn on_failover(&self, from_store: &str, to_store: &str, _error: &CacheError) {
        metrics::counter!(
            self.metric_name("failovers_total"),
            "from" => from_store.to_string(),
            "to" => to_store.to_string()
        )
        .increment(1);
        metrics::gauge!(self.metric_name("degraded")).set(1.0);
    }

    fn on_recovery(&self, store: &str) {
        metrics::counter!(self.metric_name("recoveries_total"), "store" => store.to_string())
            .increment(1);
        metrics::gauge!(self.metric_name("degraded")).set(0.0);
    }

    fn on_misconfigured(&self, store: &str, _error: Option<&CacheError>) {
        metrics::counter!(self.metric_name("misconfigured_total"), "store" => store.to_string())
            .increment(1);
    }

    fn on_fallback_error(&self, store: &str, _error: &CacheError) {
        metrics::counter!(self.metric_name("fallback_errors_total"), "store" => store.to_string())
            .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_as_str() {
        assert_eq!(FailoverEventKind::Failover.as_str(), "failover");
        assert_eq!(FailoverEventKind::Recovery.as_str(), "recovery");
        assert_eq!(FailoverEventKind::FallbackError.as_str(), "fallback_error");
    }

    #[test]
    fn test_noop_observer() {
        let observer = NoopObserver;
        let err = CacheError::Connection("refused".into());
        observer.on_failover("redis", "array", &err);
        observer.on_recovery("redis");
        observer.on_misconfigured("array", None);
        observer.on_fallback_error("array", &err);
    }
}
