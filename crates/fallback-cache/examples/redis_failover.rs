//! Redis primary with a file store fallback
//!
//! Run with and without a local Redis to see both paths:
//! `cargo run --example redis_failover --features redis`

use fallback_cache::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fallback_cache=debug".into()),
        )
        .init();

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let config = FailoverConfig::new("redis", "file")
        .store(
            BackendDescriptor::remote("redis", url)
                .timeout(Duration::from_millis(200))
                .prefix("example"),
        )
        .store(BackendDescriptor::file(
            "file",
            std::env::temp_dir().join("fallback-cache-redis-example"),
        ))
        .apply_env(|name| std::env::var(name).ok());

    let cache = FailoverCacheManager::new(config)?;

    let hits: u64 = cache
        .remember("visits", Some(Duration::from_secs(60)), || async { Ok(1) })
        .await?;
    println!("visits = {} (served by [{}])", hits, cache.active_store());

    cache.put_value("visits", &(hits + 1), Some(Duration::from_secs(60))).await?;
    let again: Option<u64> = cache.get_value("visits").await?;
    println!("visits = {:?} (served by [{}])", again, cache.active_store());

    if cache.is_failed_over() {
        println!("Redis was unreachable; values live in the file store until reset_failover()");
    }

    Ok(())
}
