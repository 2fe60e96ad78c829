//! Backend construction from descriptors

use async_trait::async_trait;
use std::sync::Arc;

use fallback_cache_core::{BackendDescriptor, CacheBackend, DriverKind, Result};

/// Builds live backends from descriptors
///
/// Remote drivers are expected to probe the server before returning, so an
/// unreachable store fails here with `CacheError::Connection` or
/// `CacheError::Timeout`. Structural problems (bad path, bad table name,
/// driver not available) fail with `CacheError::Configuration`.
#[async_trait]
pub trait BackendFactory: Send + Sync + 'static {
    async fn create(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>>;
}

#[async_trait]
impl<F: BackendFactory + ?Sized> BackendFactory for Arc<F> {
    async fn create(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
        (**self).create(descriptor).await
    }
}

/// Factory for the built-in drivers
///
/// Drivers not compiled in (see the crate features) fail with a
/// configuration error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreFactory;

#[async_trait]
impl BackendFactory for StoreFactory {
    async fn create(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
        tracing::debug!(store = %descriptor.name, driver = %descriptor.driver, "creating cache store");
        match descriptor.driver {
            DriverKind::Memory => memory_store(descriptor),
            DriverKind::File => file_store(descriptor).await,
            DriverKind::Table => table_store(descriptor).await,
            DriverKind::Remote => remote_store(descriptor).await,
        }
    }
}

#[cfg(not(all(feature = "memory", feature = "file", feature = "table", feature = "redis")))]
fn not_compiled(descriptor: &BackendDescriptor, feature: &str) -> fallback_cache_core::CacheError {
    fallback_cache_core::CacheError::Configuration(format!(
        "cache store [{}] needs the `{}` feature",
        descriptor.name, feature
    ))
}

#[cfg(feature = "memory")]
fn memory_store(descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
    use fallback_cache_storage::{MemoryBackend, MemoryConfig};

    let config = match descriptor.params.capacity {
        Some(capacity) => MemoryConfig::with_capacity(capacity),
        None => MemoryConfig::default(),
    };
    Ok(Arc::new(MemoryBackend::new(config)))
}

#[cfg(not(feature = "memory"))]
fn memory_store(descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
    Err(not_compiled(descriptor, "memory"))
}

#[cfg(feature = "file")]
async fn file_store(descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
    use fallback_cache_storage::{FileBackend, FileConfig};

    let mut config = match &descriptor.params.path {
        Some(path) => FileConfig::new(path.clone()),
        None => FileConfig::default(),
    };
    if let Some(prefix) = &descriptor.params.prefix {
        config = config.prefix(prefix.clone());
    }
    Ok(Arc::new(FileBackend::open(config).await?))
}

#[cfg(not(feature = "file"))]
async fn file_store(descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
    Err(not_compiled(descriptor, "file"))
}

#[cfg(feature = "table")]
async fn table_store(descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
    use fallback_cache_storage::{TableBackend, TableConfig};

    let mut config = TableConfig {
        path: descriptor.params.path.clone(),
        ..Default::default()
    };
    if let Some(table) = &descriptor.params.table {
        config = config.table(table.clone());
    }
    if let Some(prefix) = &descriptor.params.prefix {
        config = config.prefix(prefix.clone());
    }
    Ok(Arc::new(TableBackend::open(config).await?))
}

#[cfg(not(feature = "table"))]
async fn table_store(descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
    Err(not_compiled(descriptor, "table"))
}

#[cfg(feature = "redis")]
async fn remote_store(descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
    use fallback_cache_storage::{RedisBackend, RedisConfig};

    let params = &descriptor.params;
    let mut config = match (&params.url, &params.host) {
        (Some(url), _) => RedisConfig::new(url.clone()),
        (None, Some(host)) => RedisConfig::from_host(host, params.port.unwrap_or(6379)),
        (None, None) => RedisConfig::default(),
    };
    if let Some(timeout) = params.timeout() {
        config = config.timeout(timeout);
    }
    if let Some(pool_size) = params.pool_size {
        config = config.pool_size(pool_size);
    }
    if let Some(prefix) = &params.prefix {
        config = config.prefix(prefix.clone());
    }
    Ok(Arc::new(RedisBackend::connect(config).await?))
}

#[cfg(not(feature = "redis"))]
async fn remote_store(descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
    Err(not_compiled(descriptor, "redis"))
}
