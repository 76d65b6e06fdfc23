//! # Authentication Module
//!
//! Token lifecycle for the docflow API client: storage, expiry arithmetic,
//! single-flight refresh, the authenticated request pipeline and proactive
//! renewal.
//!
//! ## Overview
//!
//! - [`TokenStore`] persists the access/refresh pair as one unit through the
//!   host's `SessionStore`
//! - [`token_clock`] reads the `exp` claim of access tokens
//! - [`RefreshCoordinator`] guarantees at most one refresh request in flight
//!   and raises the session-ended signal when renewal fails
//! - [`RequestPipeline`] attaches bearer tokens and replays a request once
//!   after a 401
//! - [`ProactiveScheduler`] refreshes ahead of expiry
//! - [`AuthSession`] wires everything together for the host
//!
//! ## Features
//!
//! - Runs on Tokio natively and on the browser event loop under `wasm32`
//! - Secrets are redacted from every `Debug` impl and log line
//! - Auth and request events published on the core `EventBus`

pub mod backend;
pub mod endpoints;
pub mod error;
pub mod pipeline;
pub mod redirect;
pub mod refresh;
pub mod scheduler;
pub mod session;
pub mod token_clock;
pub mod token_store;
pub mod types;

#[cfg(test)]
mod testing;

pub use backend::{HttpRefreshBackend, RefreshBackend, TokenGrant, REFRESH_TOKEN_PATH};
pub use endpoints::EndpointPolicy;
pub use error::{AuthError, RefreshFailure, Result};
pub use pipeline::RequestPipeline;
pub use redirect::LoginRedirect;
pub use refresh::{RefreshCoordinator, SessionEnded};
pub use scheduler::ProactiveScheduler;
pub use session::AuthSession;
pub use token_clock::TokenClock;
pub use token_store::TokenStore;
pub use types::{Credentials, SignupRequest, TokenKey, TokenPair};
