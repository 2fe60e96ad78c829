//! fallback-cache: Transparent failover for cache stores
//!
//! # Features
//!
//! - **Automatic failover** from a primary store (Redis, SQLite, ...) to a
//!   local fallback on the first failure
//! - **Single transition** per outage, no matter how many tasks see it fail
//! - **Manual recovery** through [`FailoverCacheManager::reset_failover`]
//! - **Pluggable serialization** (JSON, MessagePack, Bincode)
//! - **Observer hooks** for logs and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fallback_cache::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let config = FailoverConfig::new("redis", "array")
//!         .store(BackendDescriptor::remote("redis", "redis://127.0.0.1:6379"));
//!     let cache = FailoverCacheManager::new(config)?;
//!
//!     cache.put_value("answer", &42i32, None).await?;
//!
//!     // Served by Redis, or by the in-memory store if Redis is down
//!     let answer: Option<i32> = cache.get_value("answer").await?;
//!     println!("{:?} from {}", answer, cache.active_store());
//!
//!     Ok(())
//! }
//! ```

mod factory;
mod guard;
mod manager;
mod state;

// Re-export core
pub use fallback_cache_core::*;

// Re-export storage
#[cfg(feature = "memory")]
pub use fallback_cache_storage::{MemoryBackend, MemoryConfig};

#[cfg(feature = "file")]
pub use fallback_cache_storage::{FileBackend, FileConfig};

#[cfg(feature = "table")]
pub use fallback_cache_storage::{TableBackend, TableConfig};

#[cfg(feature = "redis")]
pub use fallback_cache_storage::{RedisBackend, RedisConfig};

pub use factory::{BackendFactory, StoreFactory};
pub use guard::{FailoverGuard, FailoverListener, GuardOutcome};
pub use manager::{FailoverCacheManager, FailoverCacheManagerBuilder, ManagerMode};
pub use state::FailoverState;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BackendDescriptor, CacheBackend, CacheError, DriverKind, FailoverCacheManager,
        FailoverConfig, FailoverObserver, FailoverState, JsonSerializer, ManagerMode, Result,
        Serializer, StoreFactory, TracingObserver,
    };

    #[cfg(feature = "memory")]
    pub use crate::{MemoryBackend, MemoryConfig};

    #[cfg(feature = "file")]
    pub use crate::{FileBackend, FileConfig};

    #[cfg(feature = "msgpack")]
    pub use crate::MsgPackSerializer;

    #[cfg(feature = "bincode")]
    pub use crate::BincodeSerializer;
}
