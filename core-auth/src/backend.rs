//! Refresh-token exchange with the API.
//!
//! [`RefreshBackend`] is the seam the coordinator calls once per episode.
//! [`HttpRefreshBackend`] is the production implementation: it posts the
//! refresh token to `/auth/refresh-token` through the host's [`HttpClient`],
//! without a bearer header and without going back through the request
//! pipeline, so a failing refresh can never trigger another refresh.

use crate::error::RefreshFailure;
use crate::types::{error_message, TokenResponse};
use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::platform::PlatformSendSync;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Path of the refresh endpoint, relative to the API base URL.
pub const REFRESH_TOKEN_PATH: &str = "/auth/refresh-token";

/// New tokens handed back by a successful refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// `None` when the backend does not rotate refresh tokens.
    pub refresh_token: Option<String>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("rotated", &self.refresh_token.is_some())
            .finish()
    }
}

/// Exchanges a refresh token for new tokens.
///
/// Implementations make exactly one attempt. Timeouts are applied by the
/// caller.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait RefreshBackend: PlatformSendSync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// [`RefreshBackend`] speaking the API's JSON refresh endpoint.
pub struct HttpRefreshBackend {
    http: Arc<dyn HttpClient>,
    url: String,
}

impl HttpRefreshBackend {
    /// `url` is the absolute refresh endpoint URL.
    pub fn new(http: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl RefreshBackend for HttpRefreshBackend {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure> {
        let request = HttpRequest::post(self.url.as_str())
            .json(&RefreshRequest { refresh_token })
            .map_err(|e| RefreshFailure::InvalidResponse(e.to_string()))?;

        let response = self.http.execute(request).await.map_err(|e| match e {
            BridgeError::Timeout(ms) => RefreshFailure::Timeout {
                after: std::time::Duration::from_millis(ms),
            },
            other => {
                warn!(error = %other, "Refresh request failed in transport");
                RefreshFailure::Network(other.to_string())
            }
        })?;

        if !response.is_success() {
            let message = error_message(&response.body);
            warn!(status = response.status, "Refresh token rejected");
            return Err(RefreshFailure::Rejected {
                status: response.status,
                message,
            });
        }

        let parsed: TokenResponse = response
            .json()
            .map_err(|e| RefreshFailure::InvalidResponse(e.to_string()))?;

        if parsed.access_token.trim().is_empty() {
            return Err(RefreshFailure::InvalidResponse(
                "response carried an empty access token".to_string(),
            ));
        }

        let refresh_token = parsed
            .refresh_token
            .filter(|token| !token.trim().is_empty());
        debug!(rotated = refresh_token.is_some(), "Refresh endpoint answered");

        Ok(TokenGrant::new(parsed.access_token, refresh_token))
    }
}

impl fmt::Debug for HttpRefreshBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRefreshBackend")
            .field("url", &self.url)
            .finish()
    }
}
