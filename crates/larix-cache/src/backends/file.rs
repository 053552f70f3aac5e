//! File cache backend
//!
//! One file per key, named by the blake3 hash of the key. Each file holds a
//! JSON envelope `{"expires_at": <unix seconds|null>, "value": "<base64>"}`.

use crate::{CacheBackend, CacheError, CacheResult, CacheStats};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const EXTENSION: &str = "cache";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    expires_at: Option<i64>,
    value: String,
}

impl Envelope {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map_or(false, |at| chrono::Utc::now().timestamp() >= at)
    }
}

#[derive(Debug, Clone)]
pub struct FileBackend {
    directory: PathBuf,
}

impl FileBackend {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let hash = blake3::hash(key.as_bytes());
        self.directory
            .join(format!("{}.{}", hash.to_hex(), EXTENSION))
    }

    async fn read_envelope(path: &Path) -> CacheResult<Option<Envelope>> {
        match fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(envelope) => Ok(Some(envelope)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Discarding corrupt cache file: {}", e);
                    remove_quietly(path).await?;
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn cache_files(&self) -> CacheResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Delete every expired entry, returning how many were removed
    pub async fn cleanup_expired(&self) -> CacheResult<usize> {
        let mut removed = 0;
        for path in self.cache_files().await? {
            if let Some(envelope) = Self::read_envelope(&path).await? {
                if envelope.is_expired() {
                    remove_quietly(&path).await?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Removed expired cache files");
        }
        Ok(removed)
    }
}

async fn remove_quietly(path: &Path) -> CacheResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        let Some(envelope) = Self::read_envelope(&path).await? else {
            return Ok(None);
        };
        if envelope.is_expired() {
            remove_quietly(&path).await?;
            return Ok(None);
        }
        STANDARD
            .decode(envelope.value.as_bytes())
            .map(Some)
            .map_err(|e| CacheError::backend(format!("Corrupt cache entry '{}': {}", key, e)))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        fs::create_dir_all(&self.directory).await?;
        let envelope = Envelope {
            expires_at: ttl.map(|ttl| chrono::Utc::now().timestamp() + ttl.as_secs() as i64),
            value: STANDARD.encode(value),
        };
        let path = self.path_for(key);
        // write-then-rename so readers never see a half-written file
        let staging = path.with_extension("tmp");
        fs::write(&staging, serde_json::to_vec(&envelope)?).await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        remove_quietly(&self.path_for(key)).await
    }

    async fn flush(&self) -> CacheResult<()> {
        for path in self.cache_files().await? {
            remove_quietly(&path).await?;
        }
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let files = self.cache_files().await?;
        let mut memory_usage = 0;
        for path in &files {
            if let Ok(meta) = fs::metadata(path).await {
                memory_usage += meta.len();
            }
        }
        Ok(CacheStats {
            total_keys: files.len() as u64,
            memory_usage,
            ..CacheStats::default()
        })
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
