//! Session storage backends for native hosts.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SessionStore,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// In-memory store, lost when the process exits.
///
/// Default for tests and short-lived CLI hosts.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// JSON-file store that survives restarts.
///
/// The whole map is rewritten on every change through a temporary file and
/// a rename, so a crash mid-write leaves the previous contents intact.
/// The file is read once, on first access.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    cache: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => Ok(map),
                Err(e) => {
                    // Unreadable contents are discarded, matching a cleared session.
                    warn!(path = %self.path.display(), error = %e, "Discarding corrupted session file");
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| BridgeError::Storage(format!("Failed to encode session file: {}", e)))?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!(path = %self.path.display(), keys = entries.len(), "Session file written");
        Ok(())
    }

    /// Runs `f` against the loaded map and persists it when `f` reports a change.
    async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool + Send,
    {
        let mut guard = self.cache.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }

        let Some(entries) = guard.as_mut() else {
            return Err(BridgeError::Storage("Session cache unavailable".to_string()));
        };

        let mut next = entries.clone();
        if f(&mut next) {
            self.persist(&next).await?;
            *entries = next;
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        let mut guard = self.cache.lock().await;
        match guard.as_ref() {
            Some(entries) => Ok(entries.clone()),
            None => {
                let entries = self.load().await?;
                *guard = Some(entries.clone());
                Ok(entries)
            }
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.snapshot().await?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.update(move |entries| {
            let changed = entries.get(&key) != Some(&value);
            entries.insert(key, value);
            changed
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some()).await
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.snapshot().await?.keys().cloned().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        self.update(|entries| {
            let changed = !entries.is_empty();
            entries.clear();
            changed
        })
        .await
    }
}
