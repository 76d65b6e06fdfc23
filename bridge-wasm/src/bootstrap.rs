//! Convenience helpers for wiring the wasm bridge implementations together.
//!
//! Host shells call [`build_wasm_bridges`] once at startup and hand the
//! resulting trait objects to `ClientConfig::builder()`. This plays the role
//! that the desktop defaults in `core-runtime` play for native targets.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{error::Result as BridgeResult, http::HttpClient, storage::SessionStore};

use crate::{
    http::WasmHttpClient,
    storage::{StorageArea, WasmSessionStore},
};

/// Configuration for [`build_wasm_bridges`].
#[derive(Debug, Clone)]
pub struct WasmBridgeConfig {
    /// Key prefix inside Web Storage.
    pub namespace: String,
    /// Storage area holding the session.
    pub storage_area: StorageArea,
    /// Timeout for requests that do not carry their own.
    pub request_timeout: Option<Duration>,
}

impl WasmBridgeConfig {
    /// Create a new config using the provided namespace and `sessionStorage`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            storage_area: StorageArea::Session,
            request_timeout: None,
        }
    }

    /// Keep the session in `localStorage` so it outlives the tab.
    pub fn persist_across_tabs(mut self) -> Self {
        self.storage_area = StorageArea::Local;
        self
    }

    /// Apply a default timeout to every request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl Default for WasmBridgeConfig {
    fn default() -> Self {
        Self::new("docflow")
    }
}

/// Fully constructed wasm bridge objects ready for injection into the core.
pub struct WasmBridgeSet {
    /// HTTP client powered by browser `fetch`.
    pub http_client: Arc<dyn HttpClient>,
    /// Web Storage backed session store.
    pub session_store: Arc<dyn SessionStore>,
}

/// Build the default wasm bridge stack.
pub fn build_wasm_bridges(config: WasmBridgeConfig) -> BridgeResult<WasmBridgeSet> {
    let mut http = WasmHttpClient::new()?;
    if let Some(timeout) = config.request_timeout {
        http = http.with_default_timeout(timeout);
    }
    let session_store = WasmSessionStore::with_area(&config.namespace, config.storage_area)?;

    Ok(WasmBridgeSet {
        http_client: Arc::new(http),
        session_store: Arc::new(session_store),
    })
}
