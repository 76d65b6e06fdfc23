//! Token Storage
//!
//! Persists the current [`TokenPair`] through the host's [`SessionStore`] so a
//! page reload keeps the user signed in.
//!
//! ## Layout
//!
//! Both tokens live in a single JSON document under one storage key:
//!
//! ```json
//! { "accessToken": "...", "refreshToken": "..." }
//! ```
//!
//! `SessionStore::set_item` replaces one key atomically, so readers never see
//! an access token paired with a stale refresh token.
//!
//! ## Corruption
//!
//! A document that fails to parse, or that is missing either token, is
//! removed and reported as absent. The user simply has to sign in again.

use crate::error::{AuthError, Result};
use crate::types::{TokenKey, TokenPair};
use bridge_traits::storage::SessionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Access and refresh token persistence.
///
/// Cheap to clone; clones share the underlying store. Hosts may read the
/// stored tokens, but only the refresh coordinator writes them:
///
/// ```compile_fail
/// # use core_auth::{TokenPair, TokenStore};
/// async fn overwrite(store: &TokenStore) {
///     let _ = store.set(&TokenPair::new("access", "refresh")).await;
/// }
/// ```
///
/// ```compile_fail
/// # use core_auth::TokenStore;
/// async fn wipe(store: &TokenStore) {
///     let _ = store.clear().await;
/// }
/// ```
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn SessionStore>,
    key: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    access_token: String,
    refresh_token: String,
}

impl TokenStore {
    pub fn new(store: Arc<dyn SessionStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        debug!(key = %key, "Initializing TokenStore");
        Self { store, key }
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Read one half of the stored pair.
    pub async fn get(&self, which: TokenKey) -> Result<Option<String>> {
        Ok(self.pair().await?.map(|pair| pair.get(which).to_string()))
    }

    /// Read the stored pair, `None` when signed out.
    pub async fn pair(&self) -> Result<Option<TokenPair>> {
        let raw = self.store.get_item(&self.key).await.map_err(|e| {
            warn!(error = %e, "Failed to read tokens from session storage");
            AuthError::Storage(e.to_string())
        })?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let stored: StoredTokens = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Stored tokens are corrupted, discarding them");
                self.discard_corrupted().await;
                return Ok(None);
            }
        };

        let pair = TokenPair::new(stored.access_token, stored.refresh_token);
        if !pair.is_complete() {
            warn!("Stored token pair is incomplete, discarding it");
            self.discard_corrupted().await;
            return Ok(None);
        }

        Ok(Some(pair))
    }

    /// Replace the stored pair as a unit.
    pub(crate) async fn set(&self, pair: &TokenPair) -> Result<()> {
        if !pair.is_complete() {
            return Err(AuthError::InvalidRequest(
                "refusing to store an incomplete token pair".to_string(),
            ));
        }

        let stored = StoredTokens {
            access_token: pair.access_token().to_string(),
            refresh_token: pair.refresh_token().to_string(),
        };
        let json = serde_json::to_string(&stored)
            .map_err(|e| AuthError::Storage(format!("token serialization: {e}")))?;

        self.store.set_item(&self.key, &json).await.map_err(|e| {
            warn!(error = %e, "Failed to write tokens to session storage");
            AuthError::Storage(e.to_string())
        })?;

        debug!("Token pair stored");
        Ok(())
    }

    /// Remove both tokens. Succeeds when nothing is stored.
    pub(crate) async fn clear(&self) -> Result<()> {
        self.store.remove_item(&self.key).await.map_err(|e| {
            warn!(error = %e, "Failed to remove tokens from session storage");
            AuthError::Storage(e.to_string())
        })?;

        info!("Stored tokens cleared");
        Ok(())
    }

    async fn discard_corrupted(&self) {
        if let Err(e) = self.store.remove_item(&self.key).await {
            warn!(error = %e, "Failed to delete corrupted token data");
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").field("key", &self.key).finish()
    }
}
