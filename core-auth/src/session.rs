//! # Auth Session
//!
//! Host-facing entry point that wires the token store, refresh coordinator,
//! request pipeline and proactive scheduler together from a
//! [`ClientConfig`].
//!
//! ## Lifecycle
//!
//! ```text
//!  login / signup / social ──> begin_session ──> scheduler.start ──> SignedIn
//!                                                      │
//!                       timer / 401 ──> ensure_fresh_token
//!                                                      │
//!                         failure ──> store cleared ──> SessionEnded signal
//!  logout ──> scheduler.stop ──> end_session ──> SignedOut
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthSession, Credentials};
//! use core_runtime::ClientConfig;
//! use bridge_traits::HttpRequest;
//!
//! # async fn example(config: ClientConfig) -> core_auth::Result<()> {
//! let session = AuthSession::new(config)?;
//! let mut ended = session.subscribe_session_ended();
//!
//! session.login(&Credentials::new("ana@example.com", "hunter2")).await?;
//!
//! let pipeline = session.pipeline();
//! let response = pipeline
//!     .send(HttpRequest::get(pipeline.endpoint("/documents")))
//!     .await?;
//! # let _ = (response, ended.try_recv());
//! # Ok(())
//! # }
//! ```

use crate::backend::{HttpRefreshBackend, RefreshBackend, REFRESH_TOKEN_PATH};
use crate::endpoints::EndpointPolicy;
use crate::error::{AuthError, Result};
use crate::pipeline::RequestPipeline;
use crate::redirect::LoginRedirect;
use crate::refresh::{RefreshCoordinator, SessionEnded};
use crate::scheduler::ProactiveScheduler;
use crate::token_clock::{self, TokenClock};
use crate::token_store::TokenStore;
use crate::types::{error_message, Credentials, SignupRequest, TokenKey, TokenPair, TokenResponse};
use bridge_traits::http::HttpRequest;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::ClientConfig;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

pub const LOGIN_PATH: &str = "/auth/login";
pub const SIGNUP_PATH: &str = "/auth/signup";

/// One signed-in (or signed-out) user of the client.
pub struct AuthSession {
    config: ClientConfig,
    events: EventBus,
    coordinator: Arc<RefreshCoordinator>,
    pipeline: RequestPipeline,
    scheduler: ProactiveScheduler,
    clock: TokenClock,
}

impl AuthSession {
    /// Builds a session that refreshes through `POST /auth/refresh-token`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let backend = Arc::new(HttpRefreshBackend::new(
            config.http_client.clone(),
            config.endpoint(REFRESH_TOKEN_PATH),
        ));
        Self::with_backend(config, backend)
    }

    /// Builds a session around a custom refresh backend.
    pub fn with_backend(config: ClientConfig, backend: Arc<dyn RefreshBackend>) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer);
        let store = TokenStore::new(config.session_store.clone(), config.token_storage_key.clone());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store,
            backend,
            events.clone(),
            config.refresh_timeout,
        ));
        let pipeline = RequestPipeline::new(
            config.http_client.clone(),
            coordinator.clone(),
            EndpointPolicy::new(&config.unauthenticated_paths),
            events.clone(),
            config.api_base_url.clone(),
        );
        let scheduler = ProactiveScheduler::new(
            coordinator.clone(),
            config.clock.clone(),
            config.refresh_buffer,
            events.clone(),
        );

        debug!(config = ?config, "AuthSession created");
        Ok(Self {
            clock: TokenClock::new(config.clock.clone()),
            config,
            events,
            coordinator,
            pipeline,
            scheduler,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn scheduler(&self) -> &ProactiveScheduler {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Receiver for the session-ended signal; the host navigates to
    /// [`login_redirect`](Self::login_redirect) when it fires.
    pub fn subscribe_session_ended(&self) -> broadcast::Receiver<SessionEnded> {
        self.coordinator.subscribe_session_ended()
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<()> {
        let pair = self.authenticate(LOGIN_PATH, credentials).await?;
        self.establish(pair).await
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn signup(&self, request: &SignupRequest) -> Result<()> {
        let pair = self.authenticate(SIGNUP_PATH, request).await?;
        self.establish(pair).await
    }

    /// Starts a session from tokens obtained by a social sign-in redirect.
    #[instrument(skip(self, pair))]
    pub async fn complete_social_auth(&self, pair: TokenPair) -> Result<()> {
        self.establish(pair).await
    }

    /// Signs out locally. No session-ended signal is raised, and requests
    /// failing afterwards do not raise one either.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.scheduler.stop();
        self.coordinator.end_session().await?;

        info!("Signed out");
        let _ = self.events.emit(CoreEvent::Auth(AuthEvent::SignedOut));
        Ok(())
    }

    /// Picks up a session persisted by an earlier page load.
    ///
    /// Returns `false` when nothing is stored. An expired access token is
    /// refreshed right away by the scheduler.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> Result<bool> {
        if self.coordinator.store().pair().await?.is_none() {
            debug!("No stored session to resume");
            return Ok(false);
        }

        self.scheduler.start().await?;
        info!("Stored session resumed");
        Ok(true)
    }

    /// A stored access token exists and has not expired.
    pub async fn is_authenticated(&self) -> Result<bool> {
        let token = self.coordinator.store().get(TokenKey::Access).await?;
        Ok(token.is_some_and(|token| !self.clock.is_expired(&token)))
    }

    /// Login-screen location for a user who was on `current`.
    pub fn login_redirect(&self, current: &str) -> LoginRedirect {
        LoginRedirect::for_location(&self.config.login_path, current)
    }

    async fn authenticate<B>(&self, path: &str, body: &B) -> Result<TokenPair>
    where
        B: Serialize + Sync,
    {
        let request = HttpRequest::post(self.pipeline.endpoint(path)).json(body)?;
        let response = self.pipeline.send(request).await?;

        if !response.is_success() {
            let message = error_message(&response.body);
            warn!(status = response.status, endpoint = path, "Authentication rejected");
            let _ = self.events.emit(CoreEvent::Auth(AuthEvent::AuthError {
                message: message.clone(),
                recoverable: response.is_client_error(),
            }));
            return Err(AuthError::Rejected {
                endpoint: path.to_string(),
                status: response.status,
                message,
            });
        }

        let invalid = |reason: String| AuthError::InvalidResponse {
            endpoint: path.to_string(),
            reason,
        };
        let parsed: TokenResponse = response.json().map_err(|e| invalid(e.to_string()))?;
        let refresh_token = parsed
            .refresh_token
            .ok_or_else(|| invalid("response carried no refresh token".to_string()))?;

        let pair = TokenPair::new(parsed.access_token, refresh_token);
        if !pair.is_complete() {
            return Err(invalid("response carried an empty token".to_string()));
        }
        Ok(pair)
    }

    async fn establish(&self, pair: TokenPair) -> Result<()> {
        self.coordinator.begin_session(&pair).await?;
        self.scheduler.start().await?;

        let expires_at = token_clock::expires_at(pair.access_token());
        info!(?expires_at, "Signed in");
        let _ = self
            .events
            .emit(CoreEvent::Auth(AuthEvent::SignedIn { expires_at }));
        Ok(())
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
