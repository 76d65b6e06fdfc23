//! WebAssembly Bridge Implementations
//!
//! Browser implementations of the traits defined in `bridge-traits`, built on
//! `web-sys` and `wasm-bindgen`.
//!
//! # Platform Support
//!
//! This crate is designed exclusively for the `wasm32-unknown-unknown` target.
//! On other targets it compiles to an empty crate.
//!
//! # Implementations
//!
//! - `WasmHttpClient`: `fetch` with `AbortController` timeouts
//! - `WasmSessionStore`: `sessionStorage` or `localStorage`
//!
//! # Examples
//!
//! ```ignore
//! use bridge_wasm::{build_wasm_bridges, WasmBridgeConfig};
//! use core_runtime::ClientConfig;
//!
//! let bridges = build_wasm_bridges(WasmBridgeConfig::new("docflow"))?;
//! let config = ClientConfig::builder()
//!     .api_base_url("https://api.docflow.app")
//!     .http_client(bridges.http_client)
//!     .session_store(bridges.session_store)
//!     .build()?;
//! ```

#![cfg(target_arch = "wasm32")]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod error;
pub mod http;
pub mod storage;

// Re-export commonly used types
pub use bootstrap::{build_wasm_bridges, WasmBridgeConfig, WasmBridgeSet};
pub use error::{WasmError, WasmResult};
pub use http::WasmHttpClient;
pub use storage::{StorageArea, WasmSessionStore};
