//! Synced key-value store abstraction.
//!
//! Mirrors the browser's synced storage area: string keys, JSON values,
//! bulk set and bulk remove.

use crate::error::{LicenseError, LicenseResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

/// Abstract synced key-value store.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Reads one key.
    async fn get(&self, key: &str) -> LicenseResult<Option<Value>>;

    /// Reads every stored entry.
    async fn get_all(&self) -> LicenseResult<Map<String, Value>>;

    /// Writes all entries of `items`, leaving other keys untouched.
    async fn set(&self, items: Map<String, Value>) -> LicenseResult<()>;

    /// Removes the given keys. Missing keys are ignored.
    async fn remove(&self, keys: &[String]) -> LicenseResult<()>;
}

/// In-memory store, used in tests and when no persistent backend exists.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn get(&self, key: &str) -> LicenseResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn get_all(&self) -> LicenseResult<Map<String, Value>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn set(&self, items: Map<String, Value>) -> LicenseResult<()> {
        self.entries.write().await.extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> LicenseResult<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Store kept as a single JSON object on disk.
///
/// Every write rewrites the whole document through a temporary file and a
/// rename. A missing file reads as an empty store.
pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Creates a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    async fn load(&self) -> LicenseResult<Map<String, Value>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(LicenseError::Storage(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        if bytes.is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_slice(&bytes)? {
            Value::Object(map) => Ok(map),
            _ => Err(LicenseError::Storage(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, map: &Map<String, Value>) -> LicenseResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                LicenseError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let tmp = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(map)?;
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| LicenseError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            LicenseError::Storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        debug!("Saved {} keys to {:?}", map.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl SyncStore for FileStore {
    async fn get(&self, key: &str) -> LicenseResult<Option<Value>> {
        let _guard = self.lock.read().await;
        Ok(self.load().await?.remove(key))
    }

    async fn get_all(&self) -> LicenseResult<Map<String, Value>> {
        let _guard = self.lock.read().await;
        self.load().await
    }

    async fn set(&self, items: Map<String, Value>) -> LicenseResult<()> {
        let _guard = self.lock.write().await;
        let mut map = self.load().await?;
        map.extend(items);
        self.save(&map).await
    }

    async fn remove(&self, keys: &[String]) -> LicenseResult<()> {
        let _guard = self.lock.write().await;
        let mut map = self.load().await?;
        let before = map.len();
        for key in keys {
            map.remove(key);
        }
        if map.len() == before {
            return Ok(());
        }
        self.save(&map).await
    }
}
