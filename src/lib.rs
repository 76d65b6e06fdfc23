//! Docflow client core.
//!
//! Facade over the workspace crates so host applications depend on a single
//! crate and pick their platform adapters with features:
//!
//! - `desktop-shims` (default): `reqwest` HTTP client and in-memory session
//!   storage as `ClientConfig` defaults on native targets
//! - `wasm`: `fetch` and Web Storage adapters for browser builds
//!
//! ```no_run
//! use docflow_client::{AuthSession, ClientConfig, Credentials};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder()
//!     .api_base_url("https://api.docflow.app")
//!     .build()?;
//! let session = AuthSession::new(config)?;
//! session.login(&Credentials::new("ana@example.com", "hunter2")).await?;
//! # Ok(())
//! # }
//! ```

pub use bridge_traits;
pub use core_async;
pub use core_auth;
pub use core_runtime;

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub use bridge_wasm;

pub use core_auth::{
    AuthError, AuthSession, Credentials, LoginRedirect, RequestPipeline, SessionEnded,
    SignupRequest, TokenPair,
};
pub use core_runtime::events::{AuthEvent, CoreEvent, EventBus, RequestEvent};
pub use core_runtime::logging::{init_logging, LoggingConfig};
pub use core_runtime::ClientConfig;
