//! Durable key/blob storage for cached snapshots.
//!
//! The core only talks to [`CacheStore`]: `put`, `get` and `head`. A lookup that
//! misses answers [`CacheError::NotFound`] so callers can tell an empty cache
//! apart from a broken one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::clock::Clock;

/// Makes temp file names unique per write, not just per process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("not found")]
    NotFound,

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            CacheError::NotFound
        } else {
            CacheError::Backend(e.to_string())
        }
    }
}

/// What `head` knows about a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub last_modified: DateTime<Utc>,
    pub content_type: String,
    pub cache_control: Option<String>,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
    ) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError>;

    async fn head(&self, key: &str) -> Result<CacheMeta, CacheError>;
}

/// Picks the store for a cache directory: an [`FsStore`] rooted there, or a
/// [`MemoryStore`] when there is none.
pub fn open_store(dir: Option<&Path>, clock: Arc<dyn Clock>) -> Arc<dyn CacheStore> {
    match dir {
        Some(dir) => {
            info!(dir = %dir.display(), "caching rankings on disk");
            Arc::new(FsStore::new(dir, clock))
        }
        None => {
            warn!("no cache dir configured, cached rankings won't outlive this process");
            Arc::new(MemoryStore::new(clock))
        }
    }
}

struct MemoryEntry {
    bytes: Vec<u8>,
    meta: CacheMeta,
}

/// In-process store. Objects are stamped with the injected clock on write.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Seeds an object with an explicit modification time.
    pub async fn insert_at(&self, key: &str, bytes: Vec<u8>, last_modified: DateTime<Utc>) {
        let meta = CacheMeta {
            last_modified,
            content_type: crate::CONTENT_TYPE_JSON.to_string(),
            cache_control: None,
        };
        self.entries
            .write()
            .await
            .insert(key.to_string(), MemoryEntry { bytes, meta });
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
    ) -> Result<(), CacheError> {
        let meta = CacheMeta {
            last_modified: self.clock.now(),
            content_type: content_type.to_string(),
            cache_control: cache_control.map(String::from),
        };
        self.entries
            .write()
            .await
            .insert(key.to_string(), MemoryEntry { bytes, meta });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.bytes.clone())
            .ok_or(CacheError::NotFound)
    }

    async fn head(&self, key: &str) -> Result<CacheMeta, CacheError> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.meta.clone())
            .ok_or(CacheError::NotFound)
    }
}

/// Directory-backed store.
///
/// Each object is written to `<root>/<key>` with a `<key>.meta.json` sidecar
/// next to it. Both go through a temp file and a rename, so readers never see
/// a half-written object. The sidecar is renamed last; an object without one
/// falls back to the file's mtime.
#[derive(Clone)]
pub struct FsStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && Path::new(key)
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !valid {
            return Err(CacheError::Backend(format!("invalid key: {key}")));
        }
        Ok(self.root.join(key))
    }

    fn meta_path(object: &Path) -> PathBuf {
        let mut name = object.as_os_str().to_owned();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut tmp_name = path.as_os_str().to_owned();
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        tmp_name.push(format!(".tmp-{}-{seq}", std::process::id()));
        let tmp = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::Backend(format!("rename into place: {e}")));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FsStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
    ) -> Result<(), CacheError> {
        let path = self.object_path(key)?;
        let meta = CacheMeta {
            last_modified: self.clock.now(),
            content_type: content_type.to_string(),
            cache_control: cache_control.map(String::from),
        };
        let meta_bytes =
            serde_json::to_vec(&meta).map_err(|e| CacheError::Backend(e.to_string()))?;

        Self::write_atomic(&path, &bytes).await?;
        Self::write_atomic(&Self::meta_path(&path), &meta_bytes).await?;
        tracing::debug!(key, bytes = bytes.len(), "stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let path = self.object_path(key)?;
        Ok(fs::read(&path).await?)
    }

    async fn head(&self, key: &str) -> Result<CacheMeta, CacheError> {
        let path = self.object_path(key)?;
        match fs::read(Self::meta_path(&path)).await {
            Ok(raw) => {
                serde_json::from_slice(&raw).map_err(|e| CacheError::Backend(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let modified = fs::metadata(&path).await?.modified()?;
                Ok(CacheMeta {
                    last_modified: DateTime::<Utc>::from(modified),
                    content_type: crate::CONTENT_TYPE_JSON.to_string(),
                    cache_control: None,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
