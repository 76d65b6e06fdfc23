//! Runtime-agnostic async primitives for the docflow client.
//!
//! The auth core runs on two very different executors:
//! - Native platforms (desktop, tests): Tokio
//! - WebAssembly: the browser event loop via `wasm-bindgen-futures`
//!
//! Crates above this one depend on `core-async` instead of naming Tokio
//! directly, so the same refresh and scheduling code compiles for both.
//!
//! # Modules
//!
//! - `task`: fire-and-forget task spawning
//! - `time`: `sleep`, `timeout` and a monotonic `Instant`
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     task::spawn_detached(async {
//!         sleep(Duration::from_secs(1)).await;
//!     });
//! }
//! ```

pub mod task;
pub mod time;

pub use task::spawn_detached;
pub use time::{sleep, timeout, Duration, Elapsed, Instant};
