//! Time-related abstractions.
//!
//! - On native platforms: `tokio::time`, so tests can pause and advance time
//! - On WASM: `gloo-timers` (`setTimeout`) and `performance.now()`
//!
//! Both targets report an expired [`timeout`] as the same [`Elapsed`] error.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(10)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(10));
//! }
//! ```

use std::fmt;
use std::future::Future;

pub use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
pub use tokio::time::Instant;

/// Error returned when a [`timeout`] expires before its future completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    after: Duration,
}

impl Elapsed {
    /// The deadline that was exceeded.
    pub fn after(&self) -> Duration {
        self.after
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation timed out after {} ms", self.after.as_millis())
    }
}

impl std::error::Error for Elapsed {}

// ============================================================================
// Native Implementation (Tokio)
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
/// Sleeps for the specified duration.
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await
}

#[cfg(not(target_arch = "wasm32"))]
/// Requires a future to complete before `duration` has elapsed.
///
/// Dropping the returned future drops the inner one.
pub async fn timeout<F>(duration: Duration, future: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| Elapsed { after: duration })
}

// ============================================================================
// WASM Implementation
// ============================================================================

#[cfg(target_arch = "wasm32")]
/// Sleeps for the specified duration using the browser's `setTimeout`.
pub async fn sleep(duration: Duration) {
    gloo_timers::future::sleep(duration).await
}

#[cfg(target_arch = "wasm32")]
/// Requires a future to complete before `duration` has elapsed.
pub async fn timeout<F>(duration: Duration, future: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    let sleep_fut = sleep(duration);

    futures::pin_mut!(future);
    futures::pin_mut!(sleep_fut);

    match futures::future::select(future, sleep_fut).await {
        futures::future::Either::Left((output, _)) => Ok(output),
        futures::future::Either::Right(_) => Err(Elapsed { after: duration }),
    }
}

#[cfg(target_arch = "wasm32")]
/// A monotonic instant backed by `performance.now()`.
///
/// Reads as zero when the performance API is unavailable (workers without a
/// window), which only affects elapsed-time logging.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Instant {
    millis: f64,
}

#[cfg(target_arch = "wasm32")]
impl Instant {
    pub fn now() -> Self {
        let millis = web_sys::window()
            .and_then(|window| window.performance())
            .map(|performance| performance.now())
            .unwrap_or(0.0);
        Self { millis }
    }

    pub fn elapsed(&self) -> Duration {
        Self::now().saturating_duration_since(*self)
    }

    /// Duration since `earlier`, or zero if `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        let delta = (self.millis - earlier.millis).max(0.0);
        Duration::from_secs_f64(delta / 1000.0)
    }
}

#[cfg(test)]
#[cfg(not(target_arch = "wasm32"))]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_deadline() {
        let result = timeout(Duration::from_secs(15), sleep(Duration::from_secs(60))).await;

        let err = result.unwrap_err();
        assert_eq!(err.after(), Duration::from_secs(15));
        assert_eq!(err.to_string(), "operation timed out after 15000 ms");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_passes_through_output() {
        let result = timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Ok(42));
    }
}
