//! # Refresh Coordinator
//!
//! Single-flight renewal of the access token.
//!
//! ## Overview
//!
//! Any number of callers (401 recovery in the request pipeline, the proactive
//! scheduler) may ask for a fresh token at the same moment. The coordinator
//! makes sure only one refresh request is on the wire at a time:
//!
//! ```text
//!            ensure_fresh_token()
//!                    │
//!        ┌───────────┴───────────┐
//!        │ Idle                  │ Refreshing
//!        ▼                       │
//!   spawn episode task           │
//!   call backend once            │
//!        │                       │
//!        ▼                       ▼
//!   store pair / clear store   enqueue (FIFO),
//!   state = Idle               await outcome
//!   settle queue  ───────────────┘
//! ```
//!
//! Every caller of an episode gets the same outcome, settled in the order
//! the callers arrived. A failed episode clears the stored tokens and emits
//! the session-ended signal, at most once per session.
//!
//! ## Episodes outlive their callers
//!
//! The backend call runs in a detached task, not inside the caller that
//! started the episode. Dropping any caller (a request timeout, a `select!`)
//! only drops its own receiver; the episode still settles and its result is
//! stored. An episode ends as `RefreshInterrupted` only when `begin_session`
//! or `end_session` replaced the session while it ran, or when the executor
//! dropped the task.
//!
//! ## Locking
//!
//! The state lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Waiters are settled through `oneshot` channels after the lock is
//! released. Store writes from an episode and from `begin_session` /
//! `end_session` are serialized by a separate async mutex, and every session
//! change bumps a generation counter so a refresh that started for an older
//! session never overwrites the newer one.

use crate::backend::RefreshBackend;
use crate::error::{AuthError, RefreshFailure, Result};
use crate::token_clock;
use crate::token_store::TokenStore;
use crate::types::TokenPair;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use futures::channel::oneshot;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn, Instrument};

const SESSION_ENDED_CAPACITY: usize = 8;

/// Payload of the session-ended signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnded {
    pub reason: RefreshFailure,
    pub episode: u64,
}

/// How an episode ended, as seen by every participant.
#[derive(Debug, Clone)]
enum Settled {
    Refreshed(String),
    Failed(RefreshFailure),
    Interrupted(String),
}

impl Settled {
    fn into_result(self) -> Result<String> {
        match self {
            Settled::Refreshed(token) => Ok(token),
            Settled::Failed(reason) => Err(AuthError::SessionEnded(reason)),
            Settled::Interrupted(reason) => Err(AuthError::RefreshInterrupted(reason)),
        }
    }
}

enum State {
    Idle,
    Refreshing {
        episode: u64,
        /// Callers in arrival order, the one that started the episode first.
        waiters: VecDeque<oneshot::Sender<Settled>>,
    },
}

struct Inner {
    state: State,
    /// Last episode number handed out.
    episodes: u64,
    /// Bumped by `begin_session` and `end_session`.
    session: u64,
    /// Set once the current session has ended; cleared by `begin_session`.
    session_ended_latched: bool,
}

/// Owner of the refresh state machine and sole writer of refreshed tokens.
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

struct Shared {
    store: TokenStore,
    backend: Arc<dyn RefreshBackend>,
    events: EventBus,
    refresh_timeout: Duration,
    inner: Mutex<Inner>,
    writes: tokio::sync::Mutex<()>,
    session_ended: broadcast::Sender<SessionEnded>,
}

impl RefreshCoordinator {
    pub fn new(
        store: TokenStore,
        backend: Arc<dyn RefreshBackend>,
        events: EventBus,
        refresh_timeout: Duration,
    ) -> Self {
        let (session_ended, _) = broadcast::channel(SESSION_ENDED_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                store,
                backend,
                events,
                refresh_timeout,
                inner: Mutex::new(Inner {
                    state: State::Idle,
                    episodes: 0,
                    session: 0,
                    session_ended_latched: false,
                }),
                writes: tokio::sync::Mutex::new(()),
                session_ended,
            }),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.shared.store
    }

    /// Receiver for the session-ended signal. Past signals are not replayed.
    pub fn subscribe_session_ended(&self) -> broadcast::Receiver<SessionEnded> {
        self.shared.session_ended.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(self.shared.lock().state, State::Refreshing { .. })
    }

    /// Number of refresh episodes started so far.
    pub fn episodes(&self) -> u64 {
        self.shared.lock().episodes
    }

    /// Returns a valid access token, starting a refresh episode if none is
    /// running or joining the running one otherwise.
    ///
    /// Dropping the returned future does not cancel the episode.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SessionEnded`] when the episode failed; tokens are gone.
    /// - [`AuthError::RefreshInterrupted`] when the session was replaced
    ///   while the episode ran; tokens are untouched.
    #[instrument(skip(self))]
    pub async fn ensure_fresh_token(&self) -> Result<String> {
        let (rx, start) = {
            let mut inner = self.shared.lock();
            let (tx, rx) = oneshot::channel();
            if let State::Refreshing { episode, waiters } = &mut inner.state {
                waiters.push_back(tx);
                debug!(
                    episode = *episode,
                    waiters = waiters.len(),
                    "Joining in-flight refresh"
                );
                (rx, None)
            } else {
                inner.episodes += 1;
                let episode = inner.episodes;
                inner.state = State::Refreshing {
                    episode,
                    waiters: VecDeque::from([tx]),
                };
                (rx, Some((episode, inner.session)))
            }
        };

        if let Some((episode, session)) = start {
            let shared = Arc::clone(&self.shared);
            core_async::spawn_detached(
                async move { shared.run_episode(episode, session).await }.in_current_span(),
            );
        }

        match rx.await {
            Ok(settled) => settled.into_result(),
            Err(oneshot::Canceled) => Err(AuthError::RefreshInterrupted(
                "refresh episode dropped its waiters".to_string(),
            )),
        }
    }

    /// Stores the pair of a freshly authenticated session and re-arms the
    /// session-ended signal.
    pub async fn begin_session(&self, pair: &TokenPair) -> Result<()> {
        if !pair.is_complete() {
            return Err(AuthError::InvalidRequest(
                "session requires both an access and a refresh token".to_string(),
            ));
        }

        let _writes = self.shared.writes.lock().await;
        {
            let mut inner = self.shared.lock();
            inner.session += 1;
            inner.session_ended_latched = false;
        }
        self.shared.store.set(pair).await?;
        info!("Session started");
        Ok(())
    }

    /// Clears the stored tokens for an explicit logout.
    ///
    /// Requests that fail afterwards end quietly: no session-ended signal
    /// is emitted until the next `begin_session`.
    pub async fn end_session(&self) -> Result<()> {
        let _writes = self.shared.writes.lock().await;
        {
            let mut inner = self.shared.lock();
            inner.session += 1;
            inner.session_ended_latched = true;
        }
        self.shared.store.clear().await?;
        info!("Session ended by logout");
        Ok(())
    }
}

impl Shared {
    async fn run_episode(&self, episode: u64, session: u64) {
        let mut guard = EpisodeGuard {
            shared: self,
            episode,
            armed: true,
        };

        info!(episode, "Refreshing access token");
        let _ = self
            .events
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshing { episode }));

        let exchanged = self.exchange().await;
        let outcome = self.commit(session, exchanged).await;

        guard.armed = false;
        self.settle(episode, outcome);
    }

    async fn exchange(&self) -> std::result::Result<TokenPair, RefreshFailure> {
        let current = self
            .store
            .pair()
            .await
            .map_err(|e| RefreshFailure::Storage(e.to_string()))?
            .ok_or(RefreshFailure::MissingRefreshToken)?;

        let grant = core_async::timeout(
            self.refresh_timeout,
            self.backend.refresh(current.refresh_token()),
        )
        .await
        .map_err(|elapsed| RefreshFailure::Timeout {
            after: elapsed.after(),
        })??;

        let refresh_token = grant
            .refresh_token
            .unwrap_or_else(|| current.refresh_token().to_string());
        Ok(TokenPair::new(grant.access_token, refresh_token))
    }

    /// Writes the episode's result to the store, unless the session changed
    /// underneath it.
    async fn commit(
        &self,
        session: u64,
        exchanged: std::result::Result<TokenPair, RefreshFailure>,
    ) -> Settled {
        let _writes = self.writes.lock().await;
        if self.lock().session != session {
            debug!("Session replaced during refresh, discarding result");
            return Settled::Interrupted("session changed during refresh".to_string());
        }

        let failure = match exchanged {
            Ok(pair) => match self.store.set(&pair).await {
                Ok(()) => return Settled::Refreshed(pair.access_token().to_string()),
                Err(e) => RefreshFailure::Storage(e.to_string()),
            },
            Err(failure) => failure,
        };

        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear tokens after refresh failure");
        }
        Settled::Failed(failure)
    }

    fn settle(&self, episode: u64, outcome: Settled) {
        let (waiters, signal) = {
            let mut inner = self.lock();
            let waiters = match std::mem::replace(&mut inner.state, State::Idle) {
                State::Refreshing {
                    episode: current,
                    waiters,
                } if current == episode => waiters,
                other => {
                    inner.state = other;
                    return;
                }
            };

            let signal =
                matches!(outcome, Settled::Failed(_)) && !inner.session_ended_latched;
            if signal {
                inner.session_ended_latched = true;
            }
            (waiters, signal)
        };

        debug!(episode, waiters = waiters.len(), "Settling refresh episode");
        for waiter in waiters {
            // A caller that gave up has dropped its receiver.
            let _ = waiter.send(outcome.clone());
        }

        match outcome {
            Settled::Refreshed(token) => {
                let expires_at = token_clock::expires_at(&token);
                info!(episode, ?expires_at, "Access token refreshed");
                let _ = self
                    .events
                    .emit(CoreEvent::Auth(AuthEvent::TokenRefreshed { episode, expires_at }));
            }
            Settled::Failed(reason) if signal => {
                warn!(episode, reason = %reason, "Refresh failed, session ended");
                let _ = self.events.emit(CoreEvent::Auth(AuthEvent::SessionEnded {
                    episode,
                    reason: reason.to_string(),
                }));
                let _ = self.session_ended.send(SessionEnded { reason, episode });
            }
            Settled::Failed(reason) => {
                debug!(episode, reason = %reason, "Refresh failed after session already ended");
            }
            Settled::Interrupted(reason) => {
                warn!(episode, reason = %reason, "Refresh interrupted");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("store", &self.shared.store)
            .field("refresh_timeout", &self.shared.refresh_timeout)
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}

/// Settles the episode if its task is dropped before it could, so waiters
/// never hang on an executor shutdown.
struct EpisodeGuard<'a> {
    shared: &'a Shared,
    episode: u64,
    armed: bool,
}

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.settle(
                self.episode,
                Settled::Interrupted("refresh task dropped before completion".to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TokenGrant;
    use crate::types::TokenKey;
    use async_trait::async_trait;
    use bridge_desktop::MemorySessionStore;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    mock! {
        Backend {}

        #[async_trait]
        impl RefreshBackend for Backend {
            async fn refresh(&self, refresh_token: &str) -> std::result::Result<TokenGrant, RefreshFailure>;
        }
    }

    /// Backend that blocks until released, counting calls.
    struct GatedBackend {
        calls: AtomicUsize,
        gate: Notify,
        result: std::result::Result<TokenGrant, RefreshFailure>,
    }

    impl GatedBackend {
        fn new(result: std::result::Result<TokenGrant, RefreshFailure>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                result,
            })
        }
    }

    #[async_trait]
    impl RefreshBackend for GatedBackend {
        async fn refresh(
            &self,
            _refresh_token: &str,
        ) -> std::result::Result<TokenGrant, RefreshFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.result.clone()
        }
    }

    async fn coordinator(backend: Arc<dyn RefreshBackend>) -> RefreshCoordinator {
        let store = TokenStore::new(Arc::new(MemorySessionStore::new()), "tokens");
        let coordinator =
            RefreshCoordinator::new(store, backend, EventBus::new(32), Duration::from_secs(15));
        coordinator
            .begin_session(&TokenPair::new("access-1", "refresh-1"))
            .await
            .unwrap();
        coordinator
    }

    async fn wait_until_refreshing(coordinator: &RefreshCoordinator) {
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_refresh_stores_new_pair() {
        let mut backend = MockBackend::new();
        backend
            .expect_refresh()
            .withf(|token| token.to_string() == "refresh-1")
            .times(1)
            .returning(|_| Ok(TokenGrant::new("access-2", Some("refresh-2".to_string()))));

        let coordinator = coordinator(Arc::new(backend)).await;
        let token = coordinator.ensure_fresh_token().await.unwrap();

        assert_eq!(token, "access-2");
        assert_eq!(
            coordinator.store().pair().await.unwrap(),
            Some(TokenPair::new("access-2", "refresh-2"))
        );
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_unrotated_refresh_token_is_kept() {
        let mut backend = MockBackend::new();
        backend
            .expect_refresh()
            .returning(|_| Ok(TokenGrant::new("access-2", None)));

        let coordinator = coordinator(Arc::new(backend)).await;
        coordinator.ensure_fresh_token().await.unwrap();

        assert_eq!(
            coordinator.store().get(TokenKey::Refresh).await.unwrap().as_deref(),
            Some("refresh-1")
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_call() {
        let backend = GatedBackend::new(Ok(TokenGrant::new("access-2", None)));
        let coordinator = Arc::new(coordinator(backend.clone()).await);

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.ensure_fresh_token().await })
            })
            .collect();

        wait_until_refreshing(&coordinator).await;
        while backend.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        backend.gate.notify_one();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "access-2");
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.episodes(), 1);
    }

    #[tokio::test]
    async fn test_guard_is_not_sticky() {
        let mut backend = MockBackend::new();
        let mut n = 0;
        backend.expect_refresh().times(2).returning(move |_| {
            n += 1;
            Ok(TokenGrant::new(format!("access-{}", n + 1), None))
        });

        let coordinator = coordinator(Arc::new(backend)).await;

        assert_eq!(coordinator.ensure_fresh_token().await.unwrap(), "access-2");
        assert_eq!(coordinator.ensure_fresh_token().await.unwrap(), "access-3");
        assert_eq!(coordinator.episodes(), 2);
    }

    #[tokio::test]
    async fn test_failure_clears_store_and_signals_once() {
        let mut backend = MockBackend::new();
        backend.expect_refresh().times(2).returning(|_| {
            Err(RefreshFailure::Rejected {
                status: 401,
                message: "expired".to_string(),
            })
        });

        let coordinator = coordinator(Arc::new(backend)).await;
        let mut signals = coordinator.subscribe_session_ended();

        let err = coordinator.ensure_fresh_token().await.unwrap_err();
        assert!(err.is_session_ended());
        assert!(coordinator.store().pair().await.unwrap().is_none());

        let signal = signals.try_recv().unwrap();
        assert_eq!(signal.episode, 1);
        assert!(matches!(signal.reason, RefreshFailure::Rejected { status: 401, .. }));

        // The store is empty now, but a late caller still starts an episode.
        coordinator
            .store()
            .set(&TokenPair::new("stale", "stale"))
            .await
            .unwrap();
        assert!(coordinator.ensure_fresh_token().await.is_err());
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails_without_network() {
        let mut backend = MockBackend::new();
        backend.expect_refresh().never();

        let coordinator = coordinator(Arc::new(backend)).await;
        coordinator.store().clear().await.unwrap();

        let err = coordinator.ensure_fresh_token().await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::SessionEnded(RefreshFailure::MissingRefreshToken)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_times_out() {
        struct HangingBackend;

        #[async_trait]
        impl RefreshBackend for HangingBackend {
            async fn refresh(
                &self,
                _refresh_token: &str,
            ) -> std::result::Result<TokenGrant, RefreshFailure> {
                std::future::pending().await
            }
        }

        let coordinator = coordinator(Arc::new(HangingBackend)).await;
        let err = coordinator.ensure_fresh_token().await.unwrap_err();

        assert!(matches!(
            err,
            AuthError::SessionEnded(RefreshFailure::Timeout { after }) if after == Duration::from_secs(15)
        ));
        assert!(coordinator.store().pair().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_caller_does_not_cancel_refresh() {
        struct RotatingBackend {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl RefreshBackend for RotatingBackend {
            async fn refresh(
                &self,
                _refresh_token: &str,
            ) -> std::result::Result<TokenGrant, RefreshFailure> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(TokenGrant::new("access-2", Some("rotated-1".to_string())))
            }
        }

        let backend = Arc::new(RotatingBackend {
            calls: AtomicUsize::new(0),
        });
        let coordinator = Arc::new(coordinator(backend.clone()).await);
        let mut signals = coordinator.subscribe_session_ended();

        let impatient = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                tokio::time::timeout(Duration::from_secs(1), coordinator.ensure_fresh_token())
                    .await
            })
        };
        wait_until_refreshing(&coordinator).await;

        let patient = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.ensure_fresh_token().await })
        };

        assert!(impatient.await.unwrap().is_err());
        assert_eq!(patient.await.unwrap().unwrap(), "access-2");

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            coordinator.store().pair().await.unwrap(),
            Some(TokenPair::new("access-2", "rotated-1"))
        );
        assert!(!coordinator.is_refreshing());
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_aborted_caller_still_stores_result() {
        let backend = GatedBackend::new(Ok(TokenGrant::new("access-2", None)));
        let coordinator = Arc::new(coordinator(backend.clone()).await);

        let caller = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.ensure_fresh_token().await })
        };
        while backend.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        assert!(coordinator.is_refreshing());

        backend.gate.notify_one();
        while coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            coordinator.store().get(TokenKey::Access).await.unwrap().as_deref(),
            Some("access-2")
        );
    }

    #[tokio::test]
    async fn test_waiters_settle_in_arrival_order() {
        fn queued(coordinator: &RefreshCoordinator) -> usize {
            match &coordinator.shared.lock().state {
                State::Refreshing { waiters, .. } => waiters.len(),
                State::Idle => 0,
            }
        }

        let backend = GatedBackend::new(Ok(TokenGrant::new("access-2", None)));
        let coordinator = Arc::new(coordinator(backend.clone()).await);
        let settled = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for caller in 0..5 {
            let task_coordinator = coordinator.clone();
            let settled = settled.clone();
            handles.push(tokio::spawn(async move {
                let result = task_coordinator.ensure_fresh_token().await;
                settled.lock().unwrap().push(caller);
                result
            }));
            while queued(&coordinator) < caller + 1 {
                tokio::task::yield_now().await;
            }
        }

        backend.gate.notify_one();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "access-2");
        }

        assert_eq!(*settled.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_during_refresh_discards_result() {
        let backend = GatedBackend::new(Ok(TokenGrant::new("access-2", None)));
        let coordinator = Arc::new(coordinator(backend.clone()).await);

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.ensure_fresh_token().await })
        };
        while backend.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        coordinator.end_session().await.unwrap();
        backend.gate.notify_one();

        let err = leader.await.unwrap().unwrap_err();
        assert!(matches!(err, AuthError::RefreshInterrupted(_)));
        assert!(coordinator.store().pair().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_session_rearms_signal() {
        let mut backend = MockBackend::new();
        backend
            .expect_refresh()
            .returning(|_| Err(RefreshFailure::Network("offline".to_string())));

        let coordinator = coordinator(Arc::new(backend)).await;
        let mut signals = coordinator.subscribe_session_ended();

        coordinator.ensure_fresh_token().await.unwrap_err();
        coordinator
            .begin_session(&TokenPair::new("access-9", "refresh-9"))
            .await
            .unwrap();
        coordinator.ensure_fresh_token().await.unwrap_err();

        assert_eq!(signals.try_recv().unwrap().episode, 1);
        assert_eq!(signals.try_recv().unwrap().episode, 2);
    }

    #[tokio::test]
    async fn test_incomplete_session_rejected() {
        let coordinator = coordinator(Arc::new(MockBackend::new())).await;
        let err = coordinator
            .begin_session(&TokenPair::new("access", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest(_)));
    }
}
