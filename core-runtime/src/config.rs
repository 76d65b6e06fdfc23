//! # Client Configuration
//!
//! Builder-based configuration for the docflow client core.
//!
//! ## Overview
//!
//! `ClientConfig` carries the API location, token lifecycle tuning and the
//! host bridges the auth core needs. The builder validates everything up
//! front so misconfiguration surfaces at startup, not on the first 401.
//!
//! ## Required
//!
//! - `api_base_url`: absolute `http`/`https` URL of the REST backend
//! - `HttpClient`: desktop default `ReqwestHttpClient` (`desktop-shims`)
//! - `SessionStore`: desktop default `MemorySessionStore` (`desktop-shims`)
//!
//! Browser hosts inject `bridge_wasm::WasmHttpClient` and
//! `bridge_wasm::WasmSessionStore` explicitly.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .api_base_url("https://api.docflow.example/v1")
//!     .refresh_timeout(Duration::from_secs(10))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, SessionStore, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Paths that never carry a bearer and never trigger a refresh.
pub const DEFAULT_UNAUTHENTICATED_PATHS: &[&str] = &[
    "/auth/login",
    "/auth/signup",
    "/auth/refresh-token",
    "/auth/forgot-password",
    "/auth/reset-password",
    "/auth/verify-email",
    "/auth/resend-verification",
];

/// Upper bound on a single refresh call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// Proactive refresh fires this long before the access token expires.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(300);

pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Storage key holding the serialized token pair.
pub const DEFAULT_TOKEN_STORAGE_KEY: &str = "docflow.auth.tokens";

const MIN_REFRESH_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_REFRESH_TIMEOUT: Duration = Duration::from_secs(120);

/// Client configuration. Build with [`ClientConfig::builder`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to.
    pub api_base_url: Url,

    pub refresh_timeout: Duration,

    pub refresh_buffer: Duration,

    /// Route of the host's login screen, target of session-ended redirects.
    pub login_path: String,

    /// Path suffixes sent without a bearer token.
    pub unauthenticated_paths: Vec<String>,

    pub token_storage_key: String,

    pub http_client: Arc<dyn HttpClient>,

    pub session_store: Arc<dyn SessionStore>,

    pub clock: Arc<dyn Clock>,

    /// Per-subscriber event bus buffer.
    pub event_buffer: usize,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("refresh_timeout", &self.refresh_timeout)
            .field("refresh_buffer", &self.refresh_buffer)
            .field("login_path", &self.login_path)
            .field("unauthenticated_paths", &self.unauthenticated_paths)
            .field("token_storage_key", &self.token_storage_key)
            .field("http_client", &"HttpClient { ... }")
            .field("session_store", &"SessionStore { ... }")
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Joins `path` onto the API base URL.
    ///
    /// ```ignore
    /// // api_base_url = "https://api.example.com/v1"
    /// assert_eq!(config.endpoint("/auth/login"), "https://api.example.com/v1/auth/login");
    /// ```
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - base URL scheme is `http` or `https`
    /// - refresh timeout lies within 1..=120 seconds
    /// - login path and storage key are usable
    pub fn validate(&self) -> Result<()> {
        match self.api_base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Config(format!(
                    "API base URL must use http or https, got '{}'",
                    other
                )))
            }
        }

        if self.refresh_timeout < MIN_REFRESH_TIMEOUT || self.refresh_timeout > MAX_REFRESH_TIMEOUT
        {
            return Err(Error::Config(format!(
                "Refresh timeout must be between {} and {} seconds, got {:?}",
                MIN_REFRESH_TIMEOUT.as_secs(),
                MAX_REFRESH_TIMEOUT.as_secs(),
                self.refresh_timeout
            )));
        }

        if !self.login_path.starts_with('/') {
            return Err(Error::Config(format!(
                "Login path must be absolute (start with '/'), got '{}'",
                self.login_path
            )));
        }

        if self.token_storage_key.trim().is_empty() {
            return Err(Error::Config(
                "Token storage key cannot be empty".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(Error::Config(
                "Event buffer must hold at least one event".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the API. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Web: inject bridge_wasm::WasmHttpClient."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn session_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SessionStore".to_string(),
        message: "SessionStore implementation is required for token persistence. \
                 Desktop: enable the 'desktop-shims' feature to use MemorySessionStore \
                 or inject bridge_desktop::FileSessionStore. \
                 Web: inject bridge_wasm::WasmSessionStore."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new().map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_session_store() -> Result<Arc<dyn SessionStore>> {
    Ok(Arc::new(bridge_desktop::MemorySessionStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_session_store() -> Result<Arc<dyn SessionStore>> {
    Err(session_store_missing_error())
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    api_base_url: Option<String>,
    refresh_timeout: Option<Duration>,
    refresh_buffer: Option<Duration>,
    login_path: Option<String>,
    unauthenticated_paths: Option<Vec<String>>,
    token_storage_key: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    session_store: Option<Arc<dyn SessionStore>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer: Option<usize>,
}

impl ClientConfigBuilder {
    /// Sets the API base URL (required).
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Upper bound on one refresh call (default 15 s).
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    /// Lead time of the proactive refresh (default 300 s).
    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = Some(buffer);
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = Some(path.into());
        self
    }

    /// Replaces the default unauthenticated path list.
    pub fn unauthenticated_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unauthenticated_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn token_storage_key(mut self, key: impl Into<String>) -> Self {
        self.token_storage_key = Some(key.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Overrides the wall clock (tests, simulated time).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the base URL is missing or invalid, or a tuning
    ///   value is out of range
    /// - `Error::CapabilityMissing` if a bridge is missing and no desktop
    ///   default is available
    pub fn build(self) -> Result<ClientConfig> {
        let raw_url = self.api_base_url.ok_or_else(|| {
            Error::Config("API base URL is required. Use .api_base_url() to set it.".to_string())
        })?;
        let api_base_url = Url::parse(&raw_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL '{}': {}", raw_url, e)))?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let session_store = match self.session_store {
            Some(store) => store,
            None => provide_default_session_store()?,
        };

        let config = ClientConfig {
            api_base_url,
            refresh_timeout: self.refresh_timeout.unwrap_or(DEFAULT_REFRESH_TIMEOUT),
            refresh_buffer: self.refresh_buffer.unwrap_or(DEFAULT_REFRESH_BUFFER),
            login_path: self
                .login_path
                .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string()),
            unauthenticated_paths: self.unauthenticated_paths.unwrap_or_else(|| {
                DEFAULT_UNAUTHENTICATED_PATHS
                    .iter()
                    .map(|path| path.to_string())
                    .collect()
            }),
            token_storage_key: self
                .token_storage_key
                .unwrap_or_else(|| DEFAULT_TOKEN_STORAGE_KEY.to_string()),
            http_client,
            session_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer: self
                .event_buffer
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
