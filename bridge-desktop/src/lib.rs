//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts and native
//! tests:
//! - `HttpClient` using `reqwest` (single attempt, no retries)
//! - `SessionStore` in process memory or as a JSON file on disk
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FileSessionStore, ReqwestHttpClient};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let store = FileSessionStore::new(data_dir.join("session.json"));
//! ```

mod http;
mod storage;

pub use http::ReqwestHttpClient;
pub use storage::{FileSessionStore, MemorySessionStore};
