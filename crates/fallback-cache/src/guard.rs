//! Failure detection around the primary backend

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use fallback_cache_core::{CacheBackend, CacheError, Result};

use crate::state::FailoverState;

/// Receives the side effects of a guard's failure handling
///
/// Only the caller that wins the state transition invokes
/// [`on_tripped`](Self::on_tripped), so it runs once per episode.
pub trait FailoverListener: Send + Sync + 'static {
    /// The guarded store failed and the shared state was flipped
    fn on_tripped(&self, store: &str, error: &CacheError);

    /// The guarded store failed but is also the fallback
    fn on_misconfigured(&self, store: &str, error: &CacheError);
}

/// Result of a guarded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    /// The primary served the call
    Served(T),
    /// The state was already tripped; the primary wasn't touched
    Bypassed,
}

impl<T> GuardOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> GuardOutcome<U> {
        match self {
            GuardOutcome::Served(value) => GuardOutcome::Served(f(value)),
            GuardOutcome::Bypassed => GuardOutcome::Bypassed,
        }
    }

    pub fn is_bypassed(&self) -> bool {
        matches!(self, GuardOutcome::Bypassed)
    }
}

/// Wraps the primary backend and flips [`FailoverState`] when it fails
///
/// Every error except [`CacheError::Configuration`] counts as a failure.
/// The error is still returned to the caller; rerouting is left to the
/// owner (see `FailoverCacheManager`). Once the state is tripped the guard
/// stops calling the inner backend: the `try_*` methods report
/// [`GuardOutcome::Bypassed`] and the [`CacheBackend`] impl answers with a
/// miss (`None` / `false`).
pub struct FailoverGuard {
    inner: Arc<dyn CacheBackend>,
    state: Arc<FailoverState>,
    store: String,
    misconfigured: bool,
    listener: Option<Arc<dyn FailoverListener>>,
}

impl FailoverGuard {
    pub fn new(
        inner: Arc<dyn CacheBackend>,
        state: Arc<FailoverState>,
        store: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            state,
            store: store.into(),
            misconfigured: false,
            listener: None,
        }
    }

    /// Mark the guarded store as also being the fallback
    ///
    /// A misconfigured guard never touches the state and never bypasses.
    pub fn misconfigured(mut self, misconfigured: bool) -> Self {
        self.misconfigured = misconfigured;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn FailoverListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Name of the guarded store
    pub fn store(&self) -> &str {
        &self.store
    }

    pub fn state(&self) -> &Arc<FailoverState> {
        &self.state
    }

    fn bypassed(&self) -> bool {
        !self.misconfigured && self.state.get()
    }

    fn settle<T>(&self, result: Result<T>) -> Result<GuardOutcome<T>> {
        match result {
            Ok(value) => Ok(GuardOutcome::Served(value)),
            Err(err) => {
                self.handle_failure(&err);
                Err(err)
            }
        }
    }

    fn handle_failure(&self, err: &CacheError) {
        if !err.triggers_failover() {
            return;
        }

        if self.misconfigured {
            tracing::error!(
                store = %self.store,
                error = %err,
                "cache store failed but is also the fallback store, not failing over"
            );
            if let Some(listener) = &self.listener {
                listener.on_misconfigured(&self.store, err);
            }
            return;
        }

        if self.state.trip(&self.store) {
            tracing::debug!(store = %self.store, error = %err, "cache store failed, tripping failover");
            if let Some(listener) = &self.listener {
                listener.on_tripped(&self.store, err);
            }
        } else {
            tracing::debug!(store = %self.store, error = %err, "cache store failed after failover was tripped");
        }
    }

    pub async fn try_get(&self, key: &str) -> Result<GuardOutcome<Option<Vec<u8>>>> {
        if self.bypassed() {
            return Ok(GuardOutcome::Bypassed);
        }
        self.settle(self.inner.get(key).await)
    }

    pub async fn try_put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<GuardOutcome<bool>> {
        if self.bypassed() {
            return Ok(GuardOutcome::Bypassed);
        }
        self.settle(self.inner.put(key, value, ttl).await)
    }

    pub async fn try_forget(&self, key: &str) -> Result<GuardOutcome<bool>> {
        if self.bypassed() {
            return Ok(GuardOutcome::Bypassed);
        }
        self.settle(self.inner.forget(key).await)
    }
}

#[async_trait]
impl CacheBackend for FailoverGuard {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.try_get(key).await? {
            GuardOutcome::Served(value) => Ok(value),
            GuardOutcome::Bypassed => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        match self.try_put(key, value, ttl).await? {
            GuardOutcome::Served(stored) => Ok(stored),
            GuardOutcome::Bypassed => Ok(false),
        }
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        match self.try_forget(key).await? {
            GuardOutcome::Served(removed) => Ok(removed),
            GuardOutcome::Bypassed => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        if self.bypassed() {
            return Ok(());
        }
        self.settle(self.inner.ping().await).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that fails every call with a fixed error
    struct Broken {
        error: CacheError,
        calls: AtomicUsize,
    }

    impl Broken {
        fn new(error: CacheError) -> Arc<Self> {
            Arc::new(Self {
                error,
                calls: AtomicUsize::new(0),
            })
        }

        fn fail<T>(&self) -> Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    #[async_trait]
    impl CacheBackend for Broken {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            self.fail()
        }

        async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> Result<bool> {
            self.fail()
        }

        async fn forget(&self, _key: &str) -> Result<bool> {
            self.fail()
        }
    }

    #[derive(Default)]
    struct Recorder {
        tripped: Mutex<Vec<String>>,
        misconfigured: Mutex<Vec<String>>,
    }

    impl FailoverListener for Recorder {
        fn on_tripped(&self, store: &str, _error: &CacheError) {
            self.tripped.lock().push(store.to_string());
        }

        fn on_misconfigured(&self, store: &str, _error: &CacheError) {
            self.misconfigured.lock().push(store.to_string());
        }
    }

    fn guard(backend: Arc<Broken>, state: Arc<FailoverState>, recorder: Arc<Recorder>) -> FailoverGuard {
        FailoverGuard::new(backend, state, "redis").with_listener(recorder)
    }

    #[tokio::test]
    async fn test_failure_trips_state_and_returns_error() {
        let backend = Broken::new(CacheError::Connection("refused".into()));
        let state = Arc::new(FailoverState::new());
        let recorder = Arc::new(Recorder::default());
        let guard = guard(backend.clone(), state.clone(), recorder.clone());

        let err = guard.put("k", b"v".to_vec(), None).await.unwrap_err();
        assert!(matches!(err, CacheError::Connection(_)));
        assert!(state.get());
        assert_eq!(state.failed_from().as_deref(), Some("redis"));
        assert_eq!(*recorder.tripped.lock(), vec!["redis".to_string()]);
    }

    #[tokio::test]
    async fn test_tripped_guard_bypasses_inner() {
        let backend = Broken::new(CacheError::Backend("boom".into()));
        let state = Arc::new(FailoverState::new());
        let recorder = Arc::new(Recorder::default());
        let guard = guard(backend.clone(), state.clone(), recorder.clone());

        assert!(guard.get("k").await.is_err());
        assert_eq!(guard.get("k").await.unwrap(), None);
        assert!(!guard.forget("k").await.unwrap());
        assert!(guard.try_put("k", vec![], None).await.unwrap().is_bypassed());

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.tripped.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_configuration_error_does_not_trip() {
        let backend = Broken::new(CacheError::Configuration("bad table".into()));
        let state = Arc::new(FailoverState::new());
        let recorder = Arc::new(Recorder::default());
        let guard = guard(backend, state.clone(), recorder.clone());

        let err = guard.get("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
        assert!(!state.get());
        assert!(recorder.tripped.lock().is_empty());
    }

    #[tokio::test]
    async fn test_misconfigured_guard_reports_and_keeps_state() {
        let backend = Broken::new(CacheError::Backend("out of memory".into()));
        let state = Arc::new(FailoverState::new());
        let recorder = Arc::new(Recorder::default());
        let guard = guard(backend.clone(), state.clone(), recorder.clone()).misconfigured(true);

        for _ in 0..2 {
            let err = guard.put("k", b"v".to_vec(), None).await.unwrap_err();
            assert!(matches!(err, CacheError::Backend(ref msg) if msg == "out of memory"));
        }

        assert!(!state.get());
        assert!(recorder.tripped.lock().is_empty());
        assert_eq!(recorder.misconfigured.lock().len(), 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_guards_sharing_state_trip_once() {
        let state = Arc::new(FailoverState::new());
        let recorder = Arc::new(Recorder::default());
        let first = guard(Broken::new(CacheError::Timeout), state.clone(), recorder.clone());
        let second = guard(Broken::new(CacheError::Timeout), state.clone(), recorder.clone());

        let (a, b) = tokio::join!(first.try_get("k"), second.try_get("k"));

        // Whichever ran second may have seen the tripped state already.
        let errors = [&a, &b].iter().filter(|r| r.is_err()).count();
        assert!(errors >= 1);
        assert_eq!(recorder.tripped.lock().len(), 1);
        assert_eq!(state.episode(), 1);
    }

    #[tokio::test]
    async fn test_outcome_map() {
        assert_eq!(GuardOutcome::Served(2).map(|v| v * 2), GuardOutcome::Served(4));
        assert_eq!(GuardOutcome::<i32>::Bypassed.map(|v| v * 2), GuardOutcome::Bypassed);
    }
}
