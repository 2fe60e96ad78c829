//! Core types for cache operations

mod descriptor;
mod entry;
mod stats;

pub use descriptor::{BackendDescriptor, DriverKind, DriverParams};
pub use entry::CacheEntry;
pub use stats::CacheStats;
