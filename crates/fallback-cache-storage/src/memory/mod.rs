//! In-memory cache backend

mod backend;
mod expiry;

pub use backend::{MemoryBackend, MemoryConfig};
