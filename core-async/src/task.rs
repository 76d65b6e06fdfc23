//! Task spawning abstraction.
//!
//! Only detached spawning is exposed. Callers that need to stop a task wrap
//! it in [`futures::future::Abortable`] before spawning, which works the same
//! on both executors.
//!
//! ## Native (Tokio)
//! - Spawned futures must be `Send` and may run on any worker thread
//! - Must be called from inside a Tokio runtime
//!
//! ## WASM
//! - Spawned futures run on the single browser thread and need not be `Send`

use std::future::Future;

#[cfg(not(target_arch = "wasm32"))]
/// Spawns a task on the Tokio runtime without keeping its handle.
///
/// # Examples
///
/// ```rust
/// use core_async::task::spawn_detached;
///
/// # async fn example() {
/// spawn_detached(async {
///     // background work
/// });
/// # }
/// ```
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    drop(tokio::task::spawn(future));
}

#[cfg(target_arch = "wasm32")]
/// Spawns a task on the browser event loop.
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}
