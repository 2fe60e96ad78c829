//! File-backed cache store

mod backend;

pub use backend::{FileBackend, FileConfig};
