//! Web Storage implementation of the `SessionStore` bridge.
//!
//! `sessionStorage` survives a page reload but not closing the tab, which is
//! the lifetime the token store wants by default. `localStorage` is available
//! for hosts that keep users signed in across tabs. Keys are prefixed with a
//! namespace so several apps on one origin do not clobber each other.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    storage::SessionStore,
};

use crate::error::js_error;

/// Which Web Storage area backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageArea {
    /// Per-tab, cleared when the tab closes.
    #[default]
    Session,
    /// Per-origin, persists until cleared.
    Local,
}

fn storage_area(area: StorageArea) -> BridgeResult<web_sys::Storage> {
    let window = web_sys::window().ok_or_else(|| BridgeError::NotAvailable("window".into()))?;
    let storage = match area {
        StorageArea::Session => window
            .session_storage()
            .map_err(|err| js_error("sessionStorage", err))?,
        StorageArea::Local => window
            .local_storage()
            .map_err(|err| js_error("localStorage", err))?,
    };
    storage.ok_or_else(|| BridgeError::NotAvailable(format!("{area:?} storage")))
}

fn namespaced_prefix(namespace: &str) -> String {
    format!("{namespace}::")
}

/// Browser-backed session storage.
#[derive(Clone)]
pub struct WasmSessionStore {
    storage: web_sys::Storage,
    namespace: String,
}

impl WasmSessionStore {
    /// Store scoped to `namespace` in `sessionStorage`.
    pub fn new(namespace: impl Into<String>) -> BridgeResult<Self> {
        Self::with_area(namespace, StorageArea::Session)
    }

    /// Store scoped to `namespace` in the chosen storage area.
    pub fn with_area(namespace: impl Into<String>, area: StorageArea) -> BridgeResult<Self> {
        Ok(Self {
            storage: storage_area(area)?,
            namespace: namespace.into(),
        })
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}{}", namespaced_prefix(&self.namespace), key)
    }
}

#[async_trait(?Send)]
impl SessionStore for WasmSessionStore {
    async fn get_item(&self, key: &str) -> BridgeResult<Option<String>> {
        self.storage
            .get_item(&self.key_for(key))
            .map_err(|err| js_error("get_item", err))
    }

    async fn set_item(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.storage
            .set_item(&self.key_for(key), value)
            .map_err(|err| js_error("set_item", err))
    }

    async fn remove_item(&self, key: &str) -> BridgeResult<()> {
        self.storage
            .remove_item(&self.key_for(key))
            .map_err(|err| js_error("remove_item", err))
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        let prefix = namespaced_prefix(&self.namespace);
        let len = self
            .storage
            .length()
            .map_err(|err| js_error("storage length", err))?;

        let mut keys = Vec::new();
        for idx in 0..len {
            if let Some(entry) = self
                .storage
                .key(idx)
                .map_err(|err| js_error("storage key", err))?
            {
                if let Some(key) = entry.strip_prefix(&prefix) {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }
}
