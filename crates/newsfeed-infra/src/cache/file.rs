//! File-backed cache tier - the durable layer behind Redis.
//!
//! Each key is stored as one JSON document named after the SHA-256 of the key.
//! Writes go to a temporary file first and are renamed into place, so readers
//! never observe a half-written entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use newsfeed_core::ports::{CacheError, CacheTier};

/// File cache configuration.
#[derive(Debug, Clone)]
pub struct FileCacheConfig {
    /// Directory holding the cache documents. Created on first write.
    pub dir: PathBuf,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/cache"),
        }
    }
}

impl FileCacheConfig {
    pub fn from_env() -> Self {
        Self {
            dir: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/cache")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    key: String,
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Durable cache tier on the local filesystem.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(config: FileCacheConfig) -> Self {
        Self { dir: config.dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{:x}.json", digest))
    }

    async fn remove(path: &Path) -> Result<(), CacheError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Operation(e.to_string())),
        }
    }
}

#[async_trait]
impl CacheTier for FileCache {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Operation(e.to_string())),
        };

        let record: FileRecord =
            serde_json::from_str(&raw).map_err(|e| CacheError::Serialization(e.to_string()))?;

        if record.key != key {
            tracing::warn!(key = %key, path = %path.display(), "File cache key mismatch");
            return Ok(None);
        }

        if record.expires_at.is_some_and(|exp| Utc::now() >= exp) {
            tracing::debug!(key = %key, "File cache entry expired");
            Self::remove(&path).await?;
            return Ok(None);
        }

        Ok(Some(record.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))?;

        let expires_at = ttl
            .map(|d| chrono::Duration::from_std(d).map(|d| Utc::now() + d))
            .transpose()
            .map_err(|e| CacheError::Operation(e.to_string()))?;

        let record = FileRecord {
            key: key.to_string(),
            value: value.to_string(),
            expires_at,
        };
        let body =
            serde_json::to_vec(&record).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::Operation(e.to_string()));
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        Self::remove(&self.path_for(key)).await
    }
}
