//! Threading bounds that follow the target.
//!
//! Native builds share bridge adapters across Tokio worker threads and need
//! `Send + Sync`. Browser builds run on one thread and hold `web_sys` handles,
//! which are neither, so the bounds disappear on `wasm32`.

/// `Send + Sync` on native targets, no-op on `wasm32`.
#[cfg(not(target_arch = "wasm32"))]
pub trait PlatformSendSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<T> PlatformSendSync for T where T: Send + Sync {}

#[cfg(target_arch = "wasm32")]
pub trait PlatformSendSync {}

#[cfg(target_arch = "wasm32")]
impl<T> PlatformSendSync for T {}
