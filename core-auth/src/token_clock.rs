//! Access token expiry arithmetic.
//!
//! Access tokens are JWTs; only the `exp` claim of the payload segment is
//! read. Signatures are not verified here, the backend does that on every
//! request. A token whose expiry cannot be read counts as already expired.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use bridge_traits::Clock;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<serde_json::Value>,
}

/// Expiry of `token` as Unix seconds, or `None` if it cannot be decoded.
pub fn expires_at(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let payload = payload.trim_end_matches('=');

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;

    match claims.exp? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        _ => None,
    }
}

/// Seconds from `now` until `token` expires; negative once past, `0` when
/// the token is malformed.
pub fn seconds_until_expiry(token: &str, now: i64) -> i64 {
    expires_at(token).map_or(0, |exp| exp.saturating_sub(now))
}

pub fn is_expired(token: &str, now: i64) -> bool {
    seconds_until_expiry(token, now) <= 0
}

/// How long to wait before refreshing `token` so the refresh lands `buffer`
/// ahead of expiry. Zero when that moment has already passed.
pub fn refresh_delay(token: &str, now: i64, buffer: Duration) -> Duration {
    let buffer_secs = i64::try_from(buffer.as_secs()).unwrap_or(i64::MAX);
    let remaining = seconds_until_expiry(token, now).saturating_sub(buffer_secs);
    Duration::from_secs(u64::try_from(remaining).unwrap_or(0))
}

/// The functions above bound to an injected [`Clock`].
#[derive(Clone)]
pub struct TokenClock {
    clock: Arc<dyn Clock>,
}

impl TokenClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> i64 {
        self.clock.unix_timestamp()
    }

    pub fn seconds_until_expiry(&self, token: &str) -> i64 {
        seconds_until_expiry(token, self.now())
    }

    pub fn is_expired(&self, token: &str) -> bool {
        is_expired(token, self.now())
    }

    pub fn refresh_delay(&self, token: &str, buffer: Duration) -> Duration {
        refresh_delay(token, self.now(), buffer)
    }
}

impl std::fmt::Debug for TokenClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenClock").field("now", &self.now()).finish()
    }
}
