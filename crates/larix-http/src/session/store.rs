//! Session persistence backends

use crate::errors::{HttpError, HttpResult};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Session payload
pub type SessionData = Map<String, Value>;

/// Default directory for file backed sessions
pub const SESSION_DIRECTORY: &str = "storage/framework/sessions";

/// Storage for session payloads keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Load a live session; expired sessions read as `None`
    async fn load(&self, id: &str) -> HttpResult<Option<SessionData>>;

    async fn save(&self, id: &str, data: &SessionData, ttl: Duration) -> HttpResult<()>;

    async fn destroy(&self, id: &str) -> HttpResult<()>;
}

/// In-process session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, (SessionData, Instant)>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> HttpResult<Option<SessionData>> {
        let expired = match self.sessions.get(id) {
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.sessions.remove(id);
        }
        Ok(None)
    }

    async fn save(&self, id: &str, data: &SessionData, ttl: Duration) -> HttpResult<()> {
        self.sessions
            .insert(id.to_string(), (data.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn destroy(&self, id: &str) -> HttpResult<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    expires_at: i64,
    data: SessionData,
}

/// Stores each session as `<dir>/<id>.json`
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    directory: PathBuf,
}

impl FileSessionStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Store rooted at `<base>/storage/framework/sessions`
    pub fn for_base_path(base: impl AsRef<Path>) -> Self {
        Self::new(base.as_ref().join(SESSION_DIRECTORY))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, id: &str) -> HttpResult<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(HttpError::bad_request("Invalid session id"));
        }
        Ok(self.directory.join(format!("{}.json", id)))
    }
}

fn io_error(e: std::io::Error) -> HttpError {
    HttpError::internal(format!("Session storage error: {}", e))
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, id: &str) -> HttpResult<Option<SessionData>> {
        let path = match self.path_for(id) {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };
        let file: SessionFile = match serde_json::from_str(&contents) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Discarding corrupt session file {}: {}", path.display(), e);
                return Ok(None);
            }
        };
        if file.expires_at <= Utc::now().timestamp() {
            tokio::fs::remove_file(&path).await.ok();
            return Ok(None);
        }
        Ok(Some(file.data))
    }

    async fn save(&self, id: &str, data: &SessionData, ttl: Duration) -> HttpResult<()> {
        let path = self.path_for(id)?;
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(io_error)?;
        let file = SessionFile {
            expires_at: Utc::now().timestamp() + ttl.as_secs() as i64,
            data: data.clone(),
        };
        let contents = serde_json::to_string(&file)
            .map_err(|e| HttpError::internal(format!("Session encoding failed: {}", e)))?;
        tokio::fs::write(&path, contents).await.map_err(io_error)
    }

    async fn destroy(&self, id: &str) -> HttpResult<()> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn data() -> SessionData {
        let mut data = SessionData::new();
        data.insert("user".to_string(), json!("ada"));
        data
    }

    #[tokio::test]
    async fn test_memory_store_expiry() {
        let store = MemorySessionStore::new();
        store.save("a", &data(), Duration::from_secs(60)).await.unwrap();
        store.save("b", &data(), Duration::from_secs(0)).await.unwrap();

        assert_eq!(store.load("a").await.unwrap(), Some(data()));
        assert_eq!(store.load("b").await.unwrap(), None);
        assert_eq!(store.len(), 1);

        store.destroy("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::for_base_path(dir.path());

        store.save("abc123", &data(), Duration::from_secs(60)).await.unwrap();
        assert!(dir.path().join(SESSION_DIRECTORY).join("abc123.json").exists());
        assert_eq!(store.load("abc123").await.unwrap(), Some(data()));

        store.destroy("abc123").await.unwrap();
        assert_eq!(store.load("abc123").await.unwrap(), None);
        store.destroy("abc123").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_tricks() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert_eq!(store.load("../etc/passwd").await.unwrap(), None);
        assert!(store.save("../x", &data(), Duration::from_secs(5)).await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_expired_entry_removed() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.save("old", &data(), Duration::from_secs(0)).await.unwrap();
        assert_eq!(store.load("old").await.unwrap(), None);
        assert!(!dir.path().join("old.json").exists());
    }
}
