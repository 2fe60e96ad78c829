//! File-per-key cache backend

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;

use fallback_cache_core::{CacheBackend, CacheEntry, CacheError, Result};

/// Configuration for the file backend
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Root directory of the store
    pub directory: PathBuf,
    /// Optional key prefix
    pub key_prefix: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("fallback-cache"),
            key_prefix: None,
        }
    }
}

impl FileConfig {
    /// Create config rooted at `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }

    /// Set key prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

/// Cache backend storing one JSON file per key
///
/// Keys are hashed with SHA-256 and sharded two levels deep
/// (`ab/cd/abcd...`). Writes go to a temporary file first and are renamed
/// into place, so readers never see a partial entry.
#[derive(Clone)]
pub struct FileBackend {
    config: FileConfig,
    tmp_counter: Arc<AtomicU64>,
}

impl FileBackend {
    /// Open the store, creating the directory if needed
    ///
    /// Fails with [`CacheError::Configuration`] if the directory can't be
    /// created or written to.
    pub async fn open(config: FileConfig) -> Result<Self> {
        fs::create_dir_all(&config.directory).await.map_err(|e| {
            CacheError::Configuration(format!(
                "cannot create cache directory {}: {}",
                config.directory.display(),
                e
            ))
        })?;

        let probe = config.directory.join(".write-probe");
        fs::write(&probe, b"").await.map_err(|e| {
            CacheError::Configuration(format!(
                "cache directory {} is not writable: {}",
                config.directory.display(),
                e
            ))
        })?;
        let _ = fs::remove_file(&probe).await;

        tracing::debug!(directory = %config.directory.display(), "file cache store opened");
        Ok(Self {
            config,
            tmp_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Root directory of the store
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Path of the file holding `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let full_key = match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        };
        let hash = hex::encode(Sha256::digest(full_key.as_bytes()));
        self.config
            .directory
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(hash)
    }

    async fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::Backend(format!("failed to create shard directory: {}", e)))?;
        }

        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let temp_path = path.with_extension(format!("{}.tmp", n));

        fs::write(&temp_path, content)
            .await
            .map_err(|e| CacheError::Backend(format!("failed to write temp file: {}", e)))?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CacheError::Backend(format!("failed to rename temp file: {}", e)));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Backend(e.to_string())),
        };

        let entry: CacheEntry = serde_json::from_slice(&bytes)
            .map_err(|e| CacheError::Deserialization(e.to_string()))?;

        if entry.is_expired() {
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        let entry = CacheEntry::with_ttl(value, ttl);
        let serialized =
            serde_json::to_vec(&entry).map_err(|e| CacheError::Serialization(e.to_string()))?;

        self.write_atomic(&self.path_for(key), &serialized).await?;
        Ok(true)
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Backend(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (tempfile::TempDir, FileBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(FileConfig::new(dir.path())).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_put_get_forget() {
        let (_dir, backend) = open_temp().await;

        assert!(backend.get("k").await.unwrap().is_none());
        backend.put("k", b"v".to_vec(), Some(Duration::from_secs(60))).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));

        assert!(backend.forget("k").await.unwrap());
        assert!(!backend.forget("k").await.unwrap());
        assert!(backend.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sharded_layout() {
        let (dir, backend) = open_temp().await;
        backend.put("k", b"v".to_vec(), None).await.unwrap();

        let path = backend.path_for("k");
        assert!(path.starts_with(dir.path()));
        assert_eq!(path.strip_prefix(dir.path()).unwrap().components().count(), 3);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_expired_entry_removed_on_read() {
        let (_dir, backend) = open_temp().await;
        backend.put("k", b"v".to_vec(), Some(Duration::ZERO)).await.unwrap();

        assert!(backend.get("k").await.unwrap().is_none());
        assert!(!backend.path_for("k").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let (_dir, backend) = open_temp().await;
        backend.put("k", b"v".to_vec(), None).await.unwrap();
        std::fs::write(backend.path_for("k"), b"garbage").unwrap();

        let err = backend.get("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_reopen_sees_previous_entries() {
        let (dir, backend) = open_temp().await;
        backend.put("k", b"v".to_vec(), None).await.unwrap();

        let reopened = FileBackend::open(FileConfig::new(dir.path())).await.unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_unusable_directory_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = FileBackend::open(FileConfig::new(file.join("cache")))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CacheError::Configuration(_)));
    }
}
