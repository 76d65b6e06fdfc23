//! Proactive Refresh Scheduler
//!
//! Keeps the access token fresh before it expires, so most API calls never
//! see a 401. One timer at a time: it fires `refresh_buffer` ahead of the
//! current token's expiry, refreshes through the [`RefreshCoordinator`] and
//! re-arms from the expiry of the token it just obtained.
//!
//! A failed refresh stops the scheduler. Navigation to the login screen is
//! driven by the coordinator's session-ended signal, not from here. An
//! interrupted refresh (the session was replaced underneath it) is not a
//! failure: the timer re-arms from whatever token is stored now.
//!
//! Only the sleep portion of a pending timer is cancellable. Once a refresh
//! has begun it runs to completion, and a `stop()` issued meanwhile only
//! prevents the re-arm.

use crate::error::{AuthError, Result};
use crate::refresh::RefreshCoordinator;
use crate::token_clock::TokenClock;
use crate::types::TokenKey;
use bridge_traits::Clock;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use futures::future::{AbortHandle, Abortable};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Owns the single proactive refresh timer.
///
/// Dropping the scheduler cancels its timer.
pub struct ProactiveScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    coordinator: Arc<RefreshCoordinator>,
    clock: TokenClock,
    buffer: Duration,
    events: EventBus,
    timer: Mutex<Timer>,
}

#[derive(Default)]
struct Timer {
    /// Bumped whenever a timer is armed or the scheduler is stopped.
    generation: u64,
    pending: Option<AbortHandle>,
}

impl ProactiveScheduler {
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        clock: Arc<dyn Clock>,
        buffer: Duration,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                coordinator,
                clock: TokenClock::new(clock),
                buffer,
                events,
                timer: Mutex::new(Timer::default()),
            }),
        }
    }

    /// Cancels any pending timer and arms a new one from the stored access
    /// token. Does nothing when no token is stored.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let generation = self.inner.cancel();

        let token = self
            .inner
            .coordinator
            .store()
            .get(TokenKey::Access)
            .await?;
        match token {
            Some(token) => {
                self.inner.arm(generation, &token);
            }
            None => debug!("No stored session, proactive refresh not scheduled"),
        }
        Ok(())
    }

    /// Cancels the pending timer, if any.
    pub fn stop(&self) {
        self.inner.cancel();
    }

    /// Whether a timer is pending or its refresh is running.
    pub fn is_running(&self) -> bool {
        self.inner.lock().pending.is_some()
    }
}

impl Drop for ProactiveScheduler {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

impl std::fmt::Debug for ProactiveScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProactiveScheduler")
            .field("buffer", &self.inner.buffer)
            .field("running", &self.is_running())
            .finish()
    }
}

impl SchedulerInner {
    /// Aborts the pending timer and returns the new generation.
    fn cancel(&self) -> u64 {
        let mut timer = self.lock();
        timer.generation += 1;
        if let Some(handle) = timer.pending.take() {
            handle.abort();
            debug!("Proactive refresh timer cancelled");
        }
        timer.generation
    }

    /// Arms a timer for `token`, unless the scheduler moved past
    /// `expected` in the meantime.
    fn arm(self: &Arc<Self>, expected: u64, token: &str) {
        let delay = self.clock.refresh_delay(token, self.buffer);
        let (handle, registration) = AbortHandle::new_pair();

        let generation = {
            let mut timer = self.lock();
            if timer.generation != expected {
                debug!("Scheduler restarted or stopped, not re-arming");
                return;
            }
            timer.generation += 1;
            if let Some(previous) = timer.pending.replace(handle) {
                previous.abort();
            }
            timer.generation
        };

        let delay_secs = delay.as_secs();
        info!(delay_secs, "Proactive refresh scheduled");
        let _ = self
            .events
            .emit(CoreEvent::Auth(AuthEvent::RefreshScheduled { delay_secs }));

        let inner = Arc::clone(self);
        core_async::spawn_detached(async move {
            if Abortable::new(core_async::sleep(delay), registration)
                .await
                .is_err()
            {
                return;
            }
            inner.fire(generation).await;
        });
    }

    async fn fire(self: &Arc<Self>, generation: u64) {
        if self.lock().generation != generation {
            return;
        }
        debug!("Proactive refresh timer fired");

        match self.coordinator.store().get(TokenKey::Access).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("Session gone before proactive refresh");
                self.finish(generation);
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not read tokens for proactive refresh");
                self.finish(generation);
                return;
            }
        }

        match self.coordinator.ensure_fresh_token().await {
            Ok(refreshed) => {
                let current = match self.coordinator.store().get(TokenKey::Access).await {
                    Ok(Some(token)) => token,
                    _ => refreshed,
                };
                self.arm(generation, &current);
            }
            Err(AuthError::RefreshInterrupted(reason)) => {
                debug!(%reason, "Proactive refresh interrupted, re-arming from stored token");
                match self.coordinator.store().get(TokenKey::Access).await {
                    Ok(Some(current)) => self.arm(generation, &current),
                    _ => self.finish(generation),
                }
            }
            Err(e) => {
                warn!(error = %e, "Proactive refresh failed, scheduler stopped");
                self.finish(generation);
            }
        }
    }

    fn finish(&self, generation: u64) {
        let mut timer = self.lock();
        if timer.generation == generation {
            timer.pending = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Timer> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RefreshBackend, TokenGrant};
    use crate::error::RefreshFailure;
    use crate::testing::{jwt, PausedClock};
    use crate::token_store::TokenStore;
    use crate::types::TokenPair;
    use async_trait::async_trait;
    use bridge_desktop::MemorySessionStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Issues tokens valid for `ttl` from the current clock reading.
    struct IssuingBackend {
        clock: Arc<dyn Clock>,
        ttl: i64,
        fail: bool,
        gate: Option<Notify>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RefreshBackend for IssuingBackend {
        async fn refresh(
            &self,
            _refresh_token: &str,
        ) -> std::result::Result<TokenGrant, RefreshFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(RefreshFailure::Network("offline".to_string()));
            }
            Ok(TokenGrant::new(
                jwt(self.clock.unix_timestamp() + self.ttl),
                None,
            ))
        }
    }

    struct Harness {
        scheduler: ProactiveScheduler,
        backend: Arc<IssuingBackend>,
        coordinator: Arc<RefreshCoordinator>,
        clock: Arc<dyn Clock>,
    }

    impl Harness {
        async fn new(initial_ttl: Option<i64>, refreshed_ttl: i64, fail: bool) -> Self {
            Self::build(initial_ttl, refreshed_ttl, fail, None).await
        }

        /// Refreshes block until `backend.gate` is notified.
        async fn gated(initial_ttl: Option<i64>, refreshed_ttl: i64) -> Self {
            Self::build(initial_ttl, refreshed_ttl, false, Some(Notify::new())).await
        }

        async fn build(
            initial_ttl: Option<i64>,
            refreshed_ttl: i64,
            fail: bool,
            gate: Option<Notify>,
        ) -> Self {
            let clock: Arc<dyn Clock> = Arc::new(PausedClock::new());
            let backend = Arc::new(IssuingBackend {
                clock: clock.clone(),
                ttl: refreshed_ttl,
                fail,
                gate,
                calls: AtomicUsize::new(0),
            });
            let store = TokenStore::new(Arc::new(MemorySessionStore::new()), "tokens");
            let events = EventBus::default();
            let coordinator = Arc::new(RefreshCoordinator::new(
                store,
                backend.clone(),
                events.clone(),
                Duration::from_secs(15),
            ));
            if let Some(ttl) = initial_ttl {
                coordinator
                    .begin_session(&TokenPair::new(jwt(clock.unix_timestamp() + ttl), "refresh"))
                    .await
                    .unwrap();
            }
            let scheduler = ProactiveScheduler::new(
                coordinator.clone(),
                clock.clone(),
                Duration::from_secs(300),
                events,
            );
            Self {
                scheduler,
                backend,
                coordinator,
                clock,
            }
        }

        fn calls(&self) -> usize {
            self.backend.calls.load(Ordering::SeqCst)
        }
    }

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_buffer_ahead_and_reschedules_from_new_token() {
        let h = Harness::new(Some(600), 900, false).await;
        h.scheduler.start().await.unwrap();
        assert!(h.scheduler.is_running());

        sleep_secs(299).await;
        assert_eq!(h.calls(), 0);

        sleep_secs(2).await;
        assert_eq!(h.calls(), 1);
        assert!(h.scheduler.is_running());

        // New token lives 900 s, so the next refresh is 600 s later.
        sleep_secs(597).await;
        assert_eq!(h.calls(), 1);
        sleep_secs(2).await;
        assert_eq!(h.calls(), 2);

        let token = h
            .coordinator
            .store()
            .get(TokenKey::Access)
            .await
            .unwrap()
            .unwrap();
        assert!(crate::token_clock::seconds_until_expiry(&token, h.clock.unix_timestamp()) > 800);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_one_timer() {
        let h = Harness::new(Some(600), 3600, false).await;
        h.scheduler.start().await.unwrap();
        h.scheduler.start().await.unwrap();

        sleep_secs(301).await;
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer() {
        let h = Harness::new(Some(600), 900, false).await;
        h.scheduler.start().await.unwrap();
        h.scheduler.stop();
        assert!(!h.scheduler.is_running());

        sleep_secs(1000).await;
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_without_session_is_noop() {
        let h = Harness::new(None, 900, false).await;
        h.scheduler.start().await.unwrap();

        assert!(!h.scheduler.is_running());
        sleep_secs(1000).await;
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_inside_buffer_refreshes_immediately() {
        let h = Harness::new(Some(120), 900, false).await;
        h.scheduler.start().await.unwrap();

        sleep_secs(1).await;
        assert_eq!(h.calls(), 1);
        assert!(h.scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_scheduler() {
        let h = Harness::new(Some(600), 900, true).await;
        let mut ended = h.coordinator.subscribe_session_ended();
        h.scheduler.start().await.unwrap();

        sleep_secs(301).await;
        assert_eq!(h.calls(), 1);
        assert!(!h.scheduler.is_running());
        assert!(ended.try_recv().is_ok());

        sleep_secs(3600).await;
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_refresh_rearms_from_stored_token() {
        let h = Harness::gated(Some(120), 900).await;
        let mut ended = h.coordinator.subscribe_session_ended();
        h.scheduler.start().await.unwrap();

        sleep_secs(1).await;
        assert_eq!(h.calls(), 1);

        // A new sign-in lands while the timer's refresh is on the wire.
        h.coordinator
            .begin_session(&TokenPair::new(
                jwt(h.clock.unix_timestamp() + 600),
                "refresh-2",
            ))
            .await
            .unwrap();
        if let Some(gate) = &h.backend.gate {
            gate.notify_one();
        }

        sleep_secs(1).await;
        assert!(h.scheduler.is_running());
        assert!(ended.try_recv().is_err());
        assert_eq!(
            h.coordinator
                .store()
                .get(TokenKey::Refresh)
                .await
                .unwrap()
                .as_deref(),
            Some("refresh-2")
        );

        // Re-armed 300 s ahead of the new token's expiry.
        sleep_secs(298).await;
        assert_eq!(h.calls(), 1);
        sleep_secs(2).await;
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_event_reports_delay() {
        let h = Harness::new(Some(600), 900, false).await;
        let mut events = h.scheduler.inner.events.subscribe();
        h.scheduler.start().await.unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            CoreEvent::Auth(AuthEvent::RefreshScheduled { delay_secs: 300 })
        );
    }
}
