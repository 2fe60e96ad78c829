//! Failover from a primary store that goes down mid-run to a file store

use async_trait::async_trait;
use fallback_cache::prelude::*;
use fallback_cache::BackendFactory;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory primary that can be "unplugged"
struct Unpluggable {
    inner: MemoryBackend,
    down: Arc<AtomicBool>,
}

impl Unpluggable {
    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(CacheError::Connection("connection reset by peer".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for Unpluggable {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        self.check()?;
        self.inner.put(key, value, ttl).await
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.forget(key).await
    }
}

/// Builds the unpluggable primary and defers everything else to the
/// built-in drivers
struct DemoFactory {
    down: Arc<AtomicBool>,
}

#[async_trait]
impl BackendFactory for DemoFactory {
    async fn create(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn CacheBackend>> {
        if descriptor.name == "primary" {
            return Ok(Arc::new(Unpluggable {
                inner: MemoryBackend::with_defaults(),
                down: self.down.clone(),
            }));
        }
        StoreFactory.create(descriptor).await
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Session {
    user_id: u64,
    token: String,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fallback_cache=info".into()),
        )
        .init();

    let dir = std::env::temp_dir().join("fallback-cache-demo");
    let config = FailoverConfig::new("primary", "file")
        .store(BackendDescriptor::memory("primary"))
        .store(BackendDescriptor::file("file", &dir))
        .prefix("demo");

    let down = Arc::new(AtomicBool::new(false));
    let cache = FailoverCacheManager::builder(config)
        .factory(DemoFactory { down: down.clone() })
        .observer(TracingObserver::new().with_service_name("failover-example"))
        .build()?;

    let session = Session {
        user_id: 7,
        token: "abc123".to_string(),
    };

    cache.put_value("session:7", &session, Some(Duration::from_secs(300))).await?;
    println!("stored session in [{}]", cache.active_store());

    println!("unplugging the primary store...");
    down.store(true, Ordering::SeqCst);

    // Primary is gone: this write is retried on the file store
    cache.put_value("session:7", &session, Some(Duration::from_secs(300))).await?;
    let restored: Option<Session> = cache.get_value("session:7").await?;
    println!(
        "read {:?} from [{}], failed over: {}",
        restored,
        cache.active_store(),
        cache.is_failed_over()
    );

    println!("plugging it back in and resetting...");
    down.store(false, Ordering::SeqCst);
    cache.reset_failover();

    let fresh: Option<Session> = cache.get_value("session:7").await?;
    println!("read {:?} from [{}]", fresh, cache.active_store());

    Ok(())
}
