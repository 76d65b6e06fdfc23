//! Shared fakes for the core-auth integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use bridge_desktop::MemorySessionStore;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{Clock, HttpClient, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use core_auth::{AuthSession, RefreshBackend, RefreshFailure, TokenGrant};
use core_runtime::ClientConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const START: i64 = 1_700_000_000;

pub fn jwt(exp: i64) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user-1","exp":{exp}}}"#))
    )
}

/// Wall clock driven by Tokio time, so paused tests control both.
pub struct TestClock {
    start: tokio::time::Instant,
}

impl TestClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let base = DateTime::from_timestamp(START, 0).unwrap();
        base + chrono::Duration::from_std(self.start.elapsed()).unwrap()
    }
}

/// The token the fake API currently accepts.
#[derive(Clone, Default)]
pub struct ValidToken(Arc<Mutex<Option<String>>>);

impl ValidToken {
    pub fn set(&self, token: &str) {
        *self.0.lock().unwrap() = Some(token.to_string());
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Protected API accepting only the current valid token.
pub struct FakeApi {
    valid: ValidToken,
    reject_all: bool,
    requests: Mutex<Vec<Option<String>>>,
}

impl FakeApi {
    pub fn new(valid: ValidToken) -> Arc<Self> {
        Arc::new(Self {
            valid,
            reject_all: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn rejecting_everything(valid: ValidToken) -> Arc<Self> {
        Arc::new(Self {
            valid,
            reject_all: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeApi {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let bearer = request.bearer().map(str::to_owned);
        self.requests.lock().unwrap().push(bearer.clone());

        let accepted = !self.reject_all && bearer.is_some() && bearer == self.valid.get();
        if accepted {
            Ok(HttpResponse::new(200, r#"{"items":[]}"#))
        } else {
            Ok(HttpResponse::new(401, r#"{"message":"jwt expired"}"#))
        }
    }
}

/// Refresh backend issuing tokens valid for `ttl` seconds, or failing.
pub struct FakeBackend {
    clock: Arc<dyn Clock>,
    valid: ValidToken,
    ttl: i64,
    failure: Option<RefreshFailure>,
    latency: Duration,
    calls: AtomicUsize,
}

impl FakeBackend {
    pub fn issuing(clock: Arc<dyn Clock>, valid: ValidToken, ttl: i64) -> Arc<Self> {
        Arc::new(Self {
            clock,
            valid,
            ttl,
            failure: None,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(clock: Arc<dyn Clock>, failure: RefreshFailure) -> Arc<Self> {
        Arc::new(Self {
            clock,
            valid: ValidToken::default(),
            ttl: 0,
            failure: Some(failure),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_latency(self: Arc<Self>, latency: Duration) -> Arc<Self> {
        let mut backend = Arc::try_unwrap(self).ok().unwrap();
        backend.latency = latency;
        Arc::new(backend)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshBackend for FakeBackend {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, RefreshFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let access = jwt(self.clock.unix_timestamp() + self.ttl);
        self.valid.set(&access);
        Ok(TokenGrant::new(access, Some(format!("refresh-{}", call + 1))))
    }
}

pub fn session(
    http: Arc<dyn HttpClient>,
    backend: Arc<dyn RefreshBackend>,
    clock: Arc<dyn Clock>,
) -> AuthSession {
    let config = ClientConfig::builder()
        .api_base_url("https://api.example.com/v1")
        .http_client(http)
        .session_store(Arc::new(MemorySessionStore::new()))
        .clock(clock)
        .build()
        .unwrap();
    AuthSession::with_backend(config, backend).unwrap()
}
