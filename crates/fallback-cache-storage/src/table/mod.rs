//! SQLite table cache store

mod backend;

pub use backend::{TableBackend, TableConfig};
