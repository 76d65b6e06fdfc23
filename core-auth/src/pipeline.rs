//! Authenticated Request Pipeline
//!
//! Every API call from the host goes through [`RequestPipeline::send`]:
//!
//! 1. Unauthenticated endpoints (login, signup, password reset...) are sent
//!    as-is and their responses returned untouched, 401 included.
//! 2. Everything else gets `Authorization: Bearer <access token>`, read from
//!    the token store at send time.
//! 3. A 401 on a protected endpoint triggers one refresh through the
//!    [`RefreshCoordinator`] and one replay with the token current at retry
//!    time. The replay's response is returned whatever its status.
//!
//! If the refresh fails the request fails with
//! [`AuthError::SessionEnded`]; the coordinator has already cleared the
//! tokens and raised the session-ended signal.

use crate::endpoints::{request_path, EndpointPolicy};
use crate::error::{AuthError, Result};
use crate::refresh::RefreshCoordinator;
use crate::token_store::TokenStore;
use crate::types::{error_message, TokenKey};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_runtime::events::{CoreEvent, EventBus, RequestEvent};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

/// HTTP front door that attaches credentials and recovers from 401s.
pub struct RequestPipeline {
    http: Arc<dyn HttpClient>,
    coordinator: Arc<RefreshCoordinator>,
    policy: EndpointPolicy,
    events: EventBus,
    base_url: Url,
}

impl RequestPipeline {
    pub fn new(
        http: Arc<dyn HttpClient>,
        coordinator: Arc<RefreshCoordinator>,
        policy: EndpointPolicy,
        events: EventBus,
        base_url: Url,
    ) -> Self {
        Self {
            http,
            coordinator,
            policy,
            events,
            base_url,
        }
    }

    pub fn policy(&self) -> &EndpointPolicy {
        &self.policy
    }

    /// Absolute URL of an API path.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn store(&self) -> &TokenStore {
        self.coordinator.store()
    }

    /// Sends `request`, attaching the bearer token and recovering from a 401
    /// once when the endpoint is protected.
    ///
    /// Non-401 statuses are returned as `Ok`; transport failures as
    /// [`AuthError::Http`].
    #[instrument(skip(self, request), fields(method = %request.method, path = %request_path(&request.url)))]
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        if self.policy.is_unauthenticated(&request.url) {
            debug!("Unauthenticated endpoint, sending without credentials");
            return Ok(self.http.execute(request).await?);
        }

        let request = match self.store().get(TokenKey::Access).await? {
            Some(token) => request.bearer_token(token),
            None => {
                debug!("No access token stored, sending without credentials");
                request
            }
        };

        let response = self.http.execute(request.clone()).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        self.replay_after_unauthorized(request).await
    }

    /// Like [`send`](Self::send), then deserializes a 2xx JSON body.
    ///
    /// Any other status becomes [`AuthError::UnexpectedStatus`].
    pub async fn send_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        let path = request_path(&request.url);
        let response = self.send(request).await?;

        if !response.is_success() {
            return Err(AuthError::UnexpectedStatus {
                status: response.status,
                message: error_message(&response.body),
            });
        }

        response.json().map_err(|e| AuthError::InvalidResponse {
            endpoint: path,
            reason: e.to_string(),
        })
    }

    async fn replay_after_unauthorized(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method.to_string();
        let path = request_path(&request.url);

        warn!("Protected request rejected with 401");
        let _ = self.events.emit(CoreEvent::Request(RequestEvent::Unauthorized {
            method: method.clone(),
            path: path.clone(),
        }));

        let sent = request.bearer().map(str::to_owned);
        let token = match self.store().get(TokenKey::Access).await? {
            Some(current) if sent.as_deref() != Some(current.as_str()) => {
                debug!("Access token changed while the request was in flight");
                current
            }
            _ => {
                let refreshed = self.coordinator.ensure_fresh_token().await?;
                self.store()
                    .get(TokenKey::Access)
                    .await?
                    .unwrap_or(refreshed)
            }
        };

        let response = self.http.execute(request.bearer_token(token)).await?;
        debug!(status = response.status, "Replayed request");
        let _ = self.events.emit(CoreEvent::Request(RequestEvent::Replayed {
            method,
            path,
            status: response.status,
        }));

        Ok(response)
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("base_url", &self.base_url.as_str())
            .field("policy", &self.policy)
            .finish()
    }
}
