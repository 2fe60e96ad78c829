//! Static backend descriptors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Storage driver behind a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Process-local map
    #[serde(alias = "array")]
    Memory,
    /// One file per key under a directory
    File,
    /// Relational table
    #[serde(alias = "database")]
    Table,
    /// Networked key-value store
    #[serde(alias = "redis")]
    Remote,
}

impl DriverKind {
    /// Resolve a driver from a store name or driver alias
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "array" | "memory" => Some(DriverKind::Memory),
            "file" => Some(DriverKind::File),
            "database" | "table" => Some(DriverKind::Table),
            "redis" | "remote" => Some(DriverKind::Remote),
            _ => None,
        }
    }

    /// Get driver as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Memory => "memory",
            DriverKind::File => "file",
            DriverKind::Table => "table",
            DriverKind::Remote => "remote",
        }
    }

    /// Whether construction involves a network connection
    pub fn is_remote(&self) -> bool {
        matches!(self, DriverKind::Remote)
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver-specific parameters, passed opaquely to the backend factory
///
/// Unset fields fall back to the driver's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverParams {
    /// Connection URL (remote), takes precedence over host/port
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Construction and probe timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Directory (file) or database file (table)
    pub path: Option<PathBuf>,
    /// Table name (table)
    pub table: Option<String>,
    /// Key prefix applied inside the store
    pub prefix: Option<String>,
    /// Maximum number of entries (memory)
    pub capacity: Option<usize>,
    /// Connection pool size (remote)
    pub pool_size: Option<u32>,
}

impl DriverParams {
    /// Construction timeout, if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Static description of one named cache store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Store name, e.g. "redis" or "fallback"
    #[serde(default)]
    pub name: String,
    pub driver: DriverKind,
    #[serde(default)]
    pub params: DriverParams,
}

impl BackendDescriptor {
    /// Create a descriptor with default parameters
    pub fn new(name: impl Into<String>, driver: DriverKind) -> Self {
        Self {
            name: name.into(),
            driver,
            params: DriverParams::default(),
        }
    }

    /// In-memory store
    pub fn memory(name: impl Into<String>) -> Self {
        Self::new(name, DriverKind::Memory)
    }

    /// File store rooted at `path`
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(name, DriverKind::File).path(path)
    }

    /// Table store in the database file at `path`
    pub fn table(name: impl Into<String>, path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self::new(name, DriverKind::Table).path(path).table_name(table)
    }

    /// Remote store at `url`
    pub fn remote(name: impl Into<String>, url: impl Into<String>) -> Self {
        let mut descriptor = Self::new(name, DriverKind::Remote);
        descriptor.params.url = Some(url.into());
        descriptor
    }

    /// Set host and port
    pub fn host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.params.host = Some(host.into());
        self.params.port = Some(port);
        self
    }

    /// Set construction timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.params.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.path = Some(path.into());
        self
    }

    /// Set table name
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.params.table = Some(table.into());
        self
    }

    /// Set key prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.params.prefix = Some(prefix.into());
        self
    }

    /// Set capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.params.capacity = Some(capacity);
        self
    }

    /// Whether both descriptors address the same physical store
    ///
    /// Memory stores are process-local, so two of them are only the same
    /// store when they share a name. Every other driver is identified by its
    /// driver kind and parameters.
    pub fn same_store(&self, other: &BackendDescriptor) -> bool {
        if self.name == other.name {
            return true;
        }
        self.driver != DriverKind::Memory
            && self.driver == other.driver
            && self.params == other.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_aliases() {
        assert_eq!(DriverKind::from_alias("array"), Some(DriverKind::Memory));
        assert_eq!(DriverKind::from_alias("database"), Some(DriverKind::Table));
        assert_eq!(DriverKind::from_alias("redis"), Some(DriverKind::Remote));
        assert_eq!(DriverKind::from_alias("memcached"), None);
        assert!(DriverKind::Remote.is_remote());
    }

    #[test]
    fn test_same_store() {
        let a = BackendDescriptor::memory("array");
        let b = BackendDescriptor::memory("fallback");
        assert!(!a.same_store(&b));
        assert!(a.same_store(&a.clone()));

        let f1 = BackendDescriptor::file("file", "/tmp/cache");
        let f2 = BackendDescriptor::file("local", "/tmp/cache");
        assert!(f1.same_store(&f2));

        let f3 = BackendDescriptor::file("other", "/tmp/elsewhere");
        assert!(!f1.same_store(&f3));
    }

    #[test]
    fn test_deserialize_with_alias() {
        let json = r#"{"name": "redis", "driver": "redis", "params": {"host": "10.0.0.1", "port": 6380, "timeout_ms": 100}}"#;
        let descriptor: BackendDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.driver, DriverKind::Remote);
        assert_eq!(descriptor.params.port, Some(6380));
        assert_eq!(descriptor.params.timeout(), Some(Duration::from_millis(100)));
    }
}
