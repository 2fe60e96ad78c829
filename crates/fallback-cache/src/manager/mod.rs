//! Failover-aware cache manager

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use fallback_cache_core::{
    BackendDescriptor, CacheBackend, CacheError, FailoverConfig, FailoverObserver,
    JsonSerializer, Result, Serializer, TracingObserver,
};

use crate::factory::{BackendFactory, StoreFactory};
use crate::guard::{FailoverGuard, FailoverListener, GuardOutcome};
use crate::state::FailoverState;

mod resolved;
use resolved::{Resolved, ResolvedBackends, Slot};

/// How the manager routes calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerMode {
    /// Primary until it fails, then the fallback until reset
    Failover,
    /// Primary and fallback are the same store; primary only, errors raw
    Misconfigured,
    /// Failover disabled (`extend_manager = false`); the default store is
    /// served as is
    Passthrough,
}

/// Cache entry point that moves traffic to the fallback store when the
/// primary fails
///
/// The first failing call on the primary trips the shared
/// [`FailoverState`] and is retried on the fallback, so callers only see an
/// error when both stores fail ([`CacheError::BackendUnavailable`]). The
/// primary stays bypassed until [`reset_failover`](Self::reset_failover).
///
/// Cloning is cheap; clones share backends and state.
///
/// ```rust,no_run
/// use fallback_cache::prelude::*;
///
/// # async fn run() -> Result<()> {
/// let config = FailoverConfig::new("redis", "array")
///     .store(BackendDescriptor::remote("redis", "redis://127.0.0.1:6379"));
/// let cache = FailoverCacheManager::new(config)?;
///
/// cache.put_value("user:1", &"alice", Some(std::time::Duration::from_secs(60))).await?;
/// let name: Option<String> = cache.get_value("user:1").await?;
/// # Ok(())
/// # }
/// ```
pub struct FailoverCacheManager<S = JsonSerializer>
where
    S: Serializer,
{
    inner: Arc<ManagerInner>,
    serializer: S,
}

impl<S: Serializer> Clone for FailoverCacheManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            serializer: self.serializer.clone(),
        }
    }
}

struct ManagerInner {
    this: Weak<ManagerInner>,
    config: FailoverConfig,
    primary: BackendDescriptor,
    fallback: BackendDescriptor,
    mode: ManagerMode,
    state: Arc<FailoverState>,
    factory: Arc<dyn BackendFactory>,
    observer: Arc<dyn FailoverObserver>,
    slots: ResolvedBackends,
}

/// Builder for [`FailoverCacheManager`]
pub struct FailoverCacheManagerBuilder<S = JsonSerializer> {
    config: FailoverConfig,
    state: Option<Arc<FailoverState>>,
    factory: Option<Arc<dyn BackendFactory>>,
    observer: Option<Arc<dyn FailoverObserver>>,
    serializer: S,
}

impl FailoverCacheManager<JsonSerializer> {
    /// Manager with the built-in drivers, a private state and tracing output
    pub fn new(config: FailoverConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: FailoverConfig) -> FailoverCacheManagerBuilder<JsonSerializer> {
        FailoverCacheManagerBuilder {
            config,
            state: None,
            factory: None,
            observer: None,
            serializer: JsonSerializer,
        }
    }
}

impl<S: Serializer> FailoverCacheManagerBuilder<S> {
    /// Share a failover state with other managers
    pub fn state(mut self, state: Arc<FailoverState>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn factory(mut self, factory: impl BackendFactory) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn observer(mut self, observer: impl FailoverObserver) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn serializer<S2: Serializer>(self, serializer: S2) -> FailoverCacheManagerBuilder<S2> {
        FailoverCacheManagerBuilder {
            config: self.config,
            state: self.state,
            factory: self.factory,
            observer: self.observer,
            serializer,
        }
    }

    /// Resolve descriptors and pick the mode
    ///
    /// No backend is constructed here; that happens on first use.
    pub fn build(self) -> Result<FailoverCacheManager<S>> {
        let primary = self.config.primary_descriptor()?;
        let fallback = match self.config.fallback_descriptor() {
            Ok(descriptor) => descriptor,
            // An undefined fallback only matters when failover is enabled
            Err(_) if !self.config.extend_manager => primary.clone(),
            Err(err) => return Err(err),
        };

        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver::new()) as Arc<dyn FailoverObserver>);

        let mode = if !self.config.extend_manager {
            ManagerMode::Passthrough
        } else if primary.same_store(&fallback) {
            tracing::error!(
                store = %primary.name,
                "fallback cache store is the default store, failover disabled"
            );
            observer.on_misconfigured(&primary.name, None);
            ManagerMode::Misconfigured
        } else {
            ManagerMode::Failover
        };

        tracing::debug!(
            primary = %primary.name,
            fallback = %fallback.name,
            mode = ?mode,
            serializer = self.serializer.name(),
            "cache manager built"
        );

        let inner = Arc::new_cyclic(|this| ManagerInner {
            this: this.clone(),
            config: self.config,
            primary,
            fallback,
            mode,
            state: self.state.unwrap_or_default(),
            factory: self
                .factory
                .unwrap_or_else(|| Arc::new(StoreFactory) as Arc<dyn BackendFactory>),
            observer,
            slots: ResolvedBackends::new(),
        });

        Ok(FailoverCacheManager {
            inner,
            serializer: self.serializer,
        })
    }
}

/// Backend chosen for one call
enum Route {
    /// Guarded primary in failover or misconfigured mode
    Guarded(Arc<FailoverGuard>),
    /// Fallback after a transition
    Fallback(Arc<dyn CacheBackend>),
    /// Passthrough target
    Direct(Arc<dyn CacheBackend>),
}

enum Op<'a> {
    Get(&'a str),
    Put(&'a str, &'a [u8], Option<Duration>),
    Forget(&'a str),
}

enum Reply {
    Value(Option<Vec<u8>>),
    Done(bool),
}

impl Op<'_> {
    async fn apply(&self, backend: &dyn CacheBackend) -> Result<Reply> {
        match *self {
            Op::Get(key) => backend.get(key).await.map(Reply::Value),
            Op::Put(key, value, ttl) => backend.put(key, value.to_vec(), ttl).await.map(Reply::Done),
            Op::Forget(key) => backend.forget(key).await.map(Reply::Done),
        }
    }

    async fn apply_guarded(&self, guard: &FailoverGuard) -> Result<GuardOutcome<Reply>> {
        match *self {
            Op::Get(key) => Ok(guard.try_get(key).await?.map(Reply::Value)),
            Op::Put(key, value, ttl) => Ok(guard.try_put(key, value.to_vec(), ttl).await?.map(Reply::Done)),
            Op::Forget(key) => Ok(guard.try_forget(key).await?.map(Reply::Done)),
        }
    }
}

/// Internal construction result; `Bypassed` means another caller tripped
/// the state while this one was waiting for the primary slot
enum ResolveError {
    Bypassed,
    Failed(CacheError),
}

impl ManagerInner {
    /// Bound a construction by the descriptor's timeout
    async fn construct(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
        let bound = descriptor
            .params
            .timeout()
            .unwrap_or_else(|| self.config.connect_timeout());

        match tokio::time::timeout(bound, self.factory.create(descriptor)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(store = %descriptor.name, timeout = ?bound, "cache store construction timed out");
                Err(CacheError::Timeout)
            }
        }
    }

    fn guard(&self, backend: Arc<dyn CacheBackend>) -> FailoverGuard {
        let listener: Arc<dyn FailoverListener> = Arc::new(Evictor(self.this.clone()));
        FailoverGuard::new(backend, self.state.clone(), self.primary.name.clone())
            .misconfigured(self.mode == ManagerMode::Misconfigured)
            .with_listener(listener)
    }

    async fn route(&self) -> Result<Route> {
        match self.mode {
            ManagerMode::Passthrough => self.resolve_direct().await.map(Route::Direct),
            ManagerMode::Misconfigured => self.resolve_guarded(0).await.map(Route::Guarded),
            ManagerMode::Failover => {
                if self.state.get() {
                    return self.resolve_fallback().await.map(Route::Fallback);
                }

                let episode = self.state.episode();
                if !self.slots.is_constructed(Slot::Primary(episode)) {
                    self.slots.evict_stale_primary(episode);
                }
                match self.resolve_primary(episode).await {
                    Ok(guard) => Ok(Route::Guarded(guard)),
                    Err(ResolveError::Bypassed) => self.resolve_fallback().await.map(Route::Fallback),
                    Err(ResolveError::Failed(err)) if err.triggers_failover() => {
                        self.trip(&err);
                        match self.resolve_fallback().await {
                            Ok(backend) => Ok(Route::Fallback(backend)),
                            Err(fallback_err) => Err(self.unavailable(err, fallback_err)),
                        }
                    }
                    Err(ResolveError::Failed(err)) => Err(err),
                }
            }
        }
    }

    async fn resolve_direct(&self) -> Result<Arc<dyn CacheBackend>> {
        let resolved = self
            .slots
            .get_or_try_init(Slot::Primary(0), || async {
                self.construct(&self.primary).await.map(Resolved::Direct)
            })
            .await?;

        match resolved {
            Resolved::Direct(backend) => Ok(backend),
            Resolved::Guarded(guard) => Ok(guard),
        }
    }

    async fn resolve_guarded(&self, episode: u64) -> Result<Arc<FailoverGuard>> {
        match self.resolve_primary(episode).await {
            Ok(guard) => Ok(guard),
            Err(ResolveError::Failed(err)) => Err(err),
            Err(ResolveError::Bypassed) => Err(CacheError::Internal(
                "primary store bypassed outside failover mode".to_string(),
            )),
        }
    }

    async fn resolve_primary(&self, episode: u64) -> std::result::Result<Arc<FailoverGuard>, ResolveError> {
        let resolved = self
            .slots
            .get_or_try_init(Slot::Primary(episode), || async {
                // Waiters queued behind a failed construction must not probe
                // a store that is already known to be down.
                if self.mode == ManagerMode::Failover && self.state.get() {
                    return Err(ResolveError::Bypassed);
                }
                tracing::debug!(store = %self.primary.name, episode, "resolving primary cache store");
                let backend = self.construct(&self.primary).await.map_err(ResolveError::Failed)?;
                Ok(Resolved::Guarded(Arc::new(self.guard(backend))))
            })
            .await?;

        match resolved {
            Resolved::Guarded(guard) => Ok(guard),
            Resolved::Direct(backend) => Ok(Arc::new(self.guard(backend))),
        }
    }

    async fn resolve_fallback(&self) -> Result<Arc<dyn CacheBackend>> {
        let resolved = self
            .slots
            .get_or_try_init(Slot::Fallback, || async {
                tracing::debug!(store = %self.fallback.name, "resolving fallback cache store");
                self.construct(&self.fallback).await.map(Resolved::Direct)
            })
            .await;

        match resolved {
            Ok(Resolved::Direct(backend)) => Ok(backend),
            Ok(Resolved::Guarded(guard)) => Ok(guard),
            Err(err) => {
                self.observer.on_fallback_error(&self.fallback.name, &err);
                Err(err)
            }
        }
    }

    /// Flip the state from a construction failure
    fn trip(&self, err: &CacheError) {
        if self.state.trip(&self.primary.name) {
            tracing::debug!(store = %self.primary.name, error = %err, "cache store unreachable, tripping failover");
            self.on_transition(err);
        }
    }

    /// Side effects of the winning transition
    fn on_transition(&self, err: &CacheError) {
        self.slots.evict_primary();
        tracing::debug!(
            from_store = %self.primary.name,
            to_store = %self.fallback.name,
            error = %err,
            "switched cache store"
        );
        self.observer.on_failover(&self.primary.name, &self.fallback.name, err);
    }

    fn unavailable(&self, primary: CacheError, fallback: CacheError) -> CacheError {
        tracing::error!(
            primary_store = %self.primary.name,
            fallback_store = %self.fallback.name,
            primary_error = %primary,
            fallback_error = %fallback,
            "primary and fallback cache stores both failed"
        );
        CacheError::unavailable(primary, fallback)
    }

    async fn on_fallback(&self, op: &Op<'_>, primary_err: Option<CacheError>) -> Result<Reply> {
        let backend = match self.resolve_fallback().await {
            Ok(backend) => backend,
            Err(err) => {
                return Err(match primary_err {
                    Some(primary_err) => self.unavailable(primary_err, err),
                    None => err,
                });
            }
        };

        match op.apply(backend.as_ref()).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.observer.on_fallback_error(&self.fallback.name, &err);
                Err(match primary_err {
                    Some(primary_err) => self.unavailable(primary_err, err),
                    None => err,
                })
            }
        }
    }

    async fn execute(&self, op: Op<'_>) -> Result<Reply> {
        match self.route().await? {
            Route::Direct(backend) => op.apply(backend.as_ref()).await,
            Route::Fallback(backend) => match op.apply(backend.as_ref()).await {
                Ok(reply) => Ok(reply),
                Err(err) => {
                    self.observer.on_fallback_error(&self.fallback.name, &err);
                    Err(err)
                }
            },
            Route::Guarded(guard) => match op.apply_guarded(&guard).await {
                Ok(GuardOutcome::Served(reply)) => Ok(reply),
                Ok(GuardOutcome::Bypassed) => self.on_fallback(&op, None).await,
                Err(err) if self.mode == ManagerMode::Failover && self.state.get() => {
                    self.on_fallback(&op, Some(err)).await
                }
                Err(err) => Err(err),
            },
        }
    }
}

/// Listener handed to guards; holds the manager weakly so the guard stored
/// in the manager's own slots doesn't keep it alive
struct Evictor(Weak<ManagerInner>);

impl FailoverListener for Evictor {
    fn on_tripped(&self, _store: &str, error: &CacheError) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_transition(error);
        }
    }

    fn on_misconfigured(&self, store: &str, error: &CacheError) {
        if let Some(inner) = self.0.upgrade() {
            inner.observer.on_misconfigured(store, Some(error));
        }
    }
}

fn unexpected(reply: Reply) -> CacheError {
    let kind = match reply {
        Reply::Value(_) => "value",
        Reply::Done(_) => "flag",
    };
    CacheError::Internal(format!("unexpected {} reply from cache store", kind))
}

impl<S: Serializer> FailoverCacheManager<S> {
    fn full_key(&self, key: &str) -> String {
        match &self.inner.config.prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Fetch raw bytes
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = self.full_key(key);
        match self.inner.execute(Op::Get(&key)).await? {
            Reply::Value(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    /// Store raw bytes
    ///
    /// `None` stores without expiry. A zero TTL removes the key instead.
    pub async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        if ttl.is_some_and(|ttl| ttl.is_zero()) {
            return self.forget(key).await;
        }

        let key = self.full_key(key);
        match self.inner.execute(Op::Put(&key, &value, ttl)).await? {
            Reply::Done(stored) => Ok(stored),
            other => Err(unexpected(other)),
        }
    }

    /// Store raw bytes without expiry
    pub async fn forever(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        self.put(key, value, None).await
    }

    pub async fn forget(&self, key: &str) -> Result<bool> {
        let key = self.full_key(key);
        match self.inner.execute(Op::Forget(&key)).await? {
            Reply::Done(removed) => Ok(removed),
            other => Err(unexpected(other)),
        }
    }

    /// Fetch and decode a value
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => self.serializer.deserialize(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Encode and store a value
    pub async fn put_value<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<bool> {
        let bytes = self.serializer.serialize(value)?;
        self.put(key, bytes, ttl).await
    }

    /// Return the cached value, or compute and store it
    ///
    /// The loader's error is returned as is and nothing is stored.
    pub async fn remember<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get_value(key).await? {
            return Ok(value);
        }

        let value = loader().await?;
        self.put_value(key, &value, ttl).await?;
        Ok(value)
    }

    /// Whether traffic is currently routed to the fallback
    pub fn is_failed_over(&self) -> bool {
        self.inner.state.get()
    }

    /// Send traffic back to the primary
    ///
    /// Clears the shared state and every backend this manager constructed.
    /// Returns `false` if the state wasn't tripped. Managers sharing the
    /// state rebuild their primary on next use.
    pub fn reset_failover(&self) -> bool {
        let inner = &self.inner;
        if !inner.state.reset() {
            return false;
        }

        inner.slots.clear();
        tracing::info!(store = %inner.primary.name, "cache failover reset, using primary store again");
        inner.observer.on_recovery(&inner.primary.name);
        true
    }

    pub fn mode(&self) -> ManagerMode {
        self.inner.mode
    }

    /// Name of the store the next call will target
    pub fn active_store(&self) -> &str {
        let inner = &self.inner;
        match inner.mode {
            ManagerMode::Failover if inner.state.get() => &inner.fallback.name,
            _ => &inner.primary.name,
        }
    }

    pub fn primary_store(&self) -> &BackendDescriptor {
        &self.inner.primary
    }

    pub fn fallback_store(&self) -> &BackendDescriptor {
        &self.inner.fallback
    }

    /// The shared failover state
    pub fn state(&self) -> &Arc<FailoverState> {
        &self.inner.state
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }
}
