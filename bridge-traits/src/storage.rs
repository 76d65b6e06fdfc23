//! Durable session storage abstraction.
//!
//! The token store needs exactly one capability from the host: a string
//! key-value map that is still readable after a full page reload within the
//! same browser session.
//!
//! - Web: `sessionStorage` (or `localStorage` when the host wants tokens to
//!   outlive the tab)
//! - Desktop: a JSON file, or process memory for tests
//!
//! Encryption at rest is the adapter's business and not required here.

use async_trait::async_trait;

use crate::error::Result;
use crate::platform::PlatformSendSync;

/// Durable key-value storage trait
///
/// # Atomicity
///
/// `set_item` must replace the value of a single key atomically: a reader
/// observes either the old value or the new value, never a mix. Callers that
/// need several values to change together store them under one key.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SessionStore;
///
/// async fn remember_tab(store: &dyn SessionStore) -> Result<()> {
///     store.set_item("last_tab", "invoices").await?;
///     Ok(())
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait SessionStore: PlatformSendSync {
    /// Retrieve a value, `Ok(None)` when the key is absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Succeeds when the key is absent.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Check if a key exists without retrieving it
    async fn has_item(&self, key: &str) -> Result<bool> {
        Ok(self.get_item(key).await?.is_some())
    }

    /// List all keys owned by this store
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Remove every key owned by this store
    async fn clear_all(&self) -> Result<()> {
        for key in self.list_keys().await? {
            self.remove_item(&key).await?;
        }
        Ok(())
    }
}
