use crate::{CacheError, FailoverEventKind, FailoverObserver};
use tracing::{error, info, warn};

/// Observer that logs failover events via `tracing`
///
/// This is the default observer of the failover manager.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    /// Service name/prefix (optional)
    service_name: Option<String>,
}

impl TracingObserver {
    /// Create new tracing observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with service name prefix
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }
}

impl FailoverObserver for TracingObserver {
    fn on_failover(&self, from_store: &str, to_store: &str, err: &CacheError) {
        warn!(
            target: "fallback_cache",
            event = FailoverEventKind::Failover.as_str(),
            from_store = %from_store,
            to_store = %to_store,
            error = %err,
            service = ?self.service_name,
            "Cache store failed, switching to fallback store"
        );
    }

    fn on_recovery(&self, store: &str) {
        info!(
            target: "fallback_cache",
            event = FailoverEventKind::Recovery.as_str(),
            store = %store,
            service = ?self.service_name,
            "Failover state reset, primary store targeted again"
        );
    }

    fn on_misconfigured(&self, store: &str, err: Option<&CacheError>) {
        error!(
            target: "fallback_cache",
            event = FailoverEventKind::Misconfigured.as_str(),
            store = %store,
            error = ?err.map(ToString::to_string),
            service = ?self.service_name,
            "Fallback store is the primary store, failover disabled"
        );
    }

    fn on_fallback_error(&self, store: &str, err: &CacheError) {
        error!(
            target: "fallback_cache",
            event = FailoverEventKind::FallbackError.as_str(),
            store = %store,
            error = %err,
            service = ?self.service_name,
            "Fallback store failed"
        );
    }
}
