//! fallback-cache-storage: Storage drivers for fallback-cache

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "memory")]
pub use memory::{MemoryBackend, MemoryConfig};

#[cfg(feature = "file")]
pub use file::{FileBackend, FileConfig};

#[cfg(feature = "table")]
pub use table::{TableBackend, TableConfig};

#[cfg(feature = "redis")]
pub use redis::{RedisBackend, RedisConfig};
