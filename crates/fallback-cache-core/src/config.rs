//! Failover configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::{BackendDescriptor, CacheError, DriverKind, Result};

/// Construction timeout used when a descriptor doesn't set one
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Environment variable naming the primary store
pub const ENV_DEFAULT_STORE: &str = "CACHE_STORE";
/// Environment variable naming the fallback store
pub const ENV_FALLBACK_STORE: &str = "FALLBACK_CACHE_STORE";
/// Environment variable toggling `extend_manager`
pub const ENV_EXTEND_MANAGER: &str = "FALLBACK_CACHE_EXTEND_MANAGER";

/// Configuration of the failover engine
///
/// Usually loaded from the application's config layer, then overlaid with
/// environment variables via [`FailoverConfig::apply_env`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Name of the primary store
    pub default_store: String,
    /// Name of the store used once the primary is unhealthy
    pub fallback_store: String,
    /// Whether the failover engine replaces the default cache entry point.
    /// When `false` the default store is served as is.
    pub extend_manager: bool,
    /// Construction bound for descriptors without a timeout
    pub connect_timeout_ms: u64,
    /// Namespace applied to every key
    pub prefix: Option<String>,
    /// Named store descriptors
    pub stores: HashMap<String, BackendDescriptor>,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            default_store: "redis".to_string(),
            fallback_store: "array".to_string(),
            extend_manager: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            prefix: None,
            stores: HashMap::new(),
        }
    }
}

impl FailoverConfig {
    /// Create config for a primary/fallback pair
    pub fn new(default_store: impl Into<String>, fallback_store: impl Into<String>) -> Self {
        Self {
            default_store: default_store.into(),
            fallback_store: fallback_store.into(),
            ..Default::default()
        }
    }

    /// Register a store descriptor under its name
    pub fn store(mut self, descriptor: BackendDescriptor) -> Self {
        self.stores.insert(descriptor.name.clone(), descriptor);
        self
    }

    /// Set whether the engine replaces the default cache
    pub fn extend_manager(mut self, extend: bool) -> Self {
        self.extend_manager = extend;
        self
    }

    /// Set the default construction timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set key namespace
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Parse configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(json).map_err(|e| CacheError::Configuration(e.to_string()))?;
        for (name, descriptor) in config.stores.iter_mut() {
            if descriptor.name.is_empty() {
                descriptor.name = name.clone();
            }
        }
        Ok(config)
    }

    /// Default configuration overlaid with the process environment
    pub fn from_env() -> Self {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment lookup
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(store) = lookup(ENV_DEFAULT_STORE).filter(|s| !s.is_empty()) {
            self.default_store = store;
        }
        if let Some(store) = lookup(ENV_FALLBACK_STORE).filter(|s| !s.is_empty()) {
            self.fallback_store = store;
        }
        if let Some(extend) = lookup(ENV_EXTEND_MANAGER).and_then(|v| parse_bool(&v)) {
            self.extend_manager = extend;
        }
        self
    }

    /// Construction bound for descriptors without a timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Look up a store by name
    ///
    /// Names that aren't configured but match a driver alias (`array`,
    /// `file`, `database`, `redis`, ...) get a descriptor with default
    /// parameters.
    pub fn descriptor(&self, name: &str) -> Result<BackendDescriptor> {
        if let Some(descriptor) = self.stores.get(name) {
            return Ok(descriptor.clone());
        }
        DriverKind::from_alias(name)
            .map(|driver| BackendDescriptor::new(name, driver))
            .ok_or_else(|| CacheError::Configuration(format!("cache store [{name}] is not defined")))
    }

    /// Descriptor of the primary store
    pub fn primary_descriptor(&self) -> Result<BackendDescriptor> {
        self.descriptor(&self.default_store)
    }

    /// Descriptor of the fallback store
    pub fn fallback_descriptor(&self) -> Result<BackendDescriptor> {
        self.descriptor(&self.fallback_store)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FailoverConfig::default();
        assert_eq!(config.default_store, "redis");
        assert_eq!(config.fallback_store, "array");
        assert!(config.extend_manager);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_alias_descriptors() {
        let config = FailoverConfig::default();
        assert_eq!(config.fallback_descriptor().unwrap().driver, DriverKind::Memory);
        assert_eq!(config.primary_descriptor().unwrap().driver, DriverKind::Remote);

        let err = config.descriptor("memcached").unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn test_explicit_store_wins_over_alias() {
        let config = FailoverConfig::new("redis", "file")
            .store(BackendDescriptor::file("file", "/var/cache/app"));
        let descriptor = config.fallback_descriptor().unwrap();
        assert_eq!(descriptor.params.path.as_deref(), Some(std::path::Path::new("/var/cache/app")));
    }

    #[test]
    fn test_apply_env() {
        let env: HashMap<&str, &str> = [
            (ENV_FALLBACK_STORE, "database"),
            (ENV_EXTEND_MANAGER, "false"),
        ]
        .into_iter()
        .collect();

        let config = FailoverConfig::default().apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.default_store, "redis");
        assert_eq!(config.fallback_store, "database");
        assert!(!config.extend_manager);
    }

    #[test]
    fn test_apply_env_ignores_garbage_bool() {
        let config = FailoverConfig::default()
            .apply_env(|k| (k == ENV_EXTEND_MANAGER).then(|| "maybe".to_string()));
        assert!(config.extend_manager);
    }

    #[test]
    fn test_from_json_fills_store_names() {
        let json = r#"{
            "default_store": "primary",
            "fallback_store": "local",
            "stores": {
                "primary": {"driver": "redis", "params": {"url": "redis://10.0.0.1:6379", "timeout_ms": 100}},
                "local": {"driver": "file", "params": {"path": "/tmp/fallback"}}
            }
        }"#;
        let config = FailoverConfig::from_json(json).unwrap();
        assert!(config.extend_manager);
        let primary = config.primary_descriptor().unwrap();
        assert_eq!(primary.name, "primary");
        assert_eq!(primary.driver, DriverKind::Remote);
        assert_eq!(config.fallback_descriptor().unwrap().name, "local");
    }

    #[test]
    fn test_from_json_invalid() {
        let err = FailoverConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }
}
