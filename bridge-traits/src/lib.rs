//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host shell must implement for the
//! docflow client core.
//!
//! ## Overview
//!
//! The authenticated-request core never talks to `fetch`, `reqwest`,
//! `sessionStorage` or the wall clock directly. It depends on the capabilities
//! below, and each host (browser build, desktop test harness) injects concrete
//! adapters.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-shot async HTTP execution
//!
//! ### Storage
//! - [`SessionStore`](storage::SessionStore) - Durable key-value storage that
//!   survives a page reload (browser `sessionStorage`, a file on desktop)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Browser  | `bridge-wasm`       | ✅ |
//! | Desktop  | `bridge-desktop`    | ✅ |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Adapters
//! should convert platform errors to `BridgeError` and never embed credential
//! material in error messages.
//!
//! ## Thread Safety
//!
//! Native builds require `Send + Sync` so adapters can be shared across Tokio
//! tasks. On `wasm32` the bounds collapse to nothing because browser handles
//! are not thread-safe; see [`platform`].
//!
//! ## Examples
//!
//! ### Implementing HttpClient
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyHttpClient {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl HttpClient for MyHttpClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod platform;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use storage::SessionStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
