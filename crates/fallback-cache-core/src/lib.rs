//! fallback-cache-core: Core traits and types for the fallback-cache library
//!
//! This crate provides the foundational types shared by the storage drivers
//! and the failover engine: the [`CacheBackend`] capability, the error
//! taxonomy, backend descriptors and the failover configuration.

mod config;
mod error;
mod traits;
mod types;

pub use config::{
    FailoverConfig, DEFAULT_CONNECT_TIMEOUT, ENV_DEFAULT_STORE, ENV_EXTEND_MANAGER,
    ENV_FALLBACK_STORE,
};
pub use error::{CacheError, Result};
pub use traits::*;
pub use types::*;
