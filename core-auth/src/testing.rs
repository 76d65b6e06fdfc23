//! Helpers shared by the unit tests of this crate.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use bridge_traits::Clock;
use chrono::{DateTime, Utc};

/// Unsigned JWT whose payload carries `exp`.
pub(crate) fn jwt(exp: i64) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user-1","exp":{exp}}}"#))
    )
}

/// Wall clock that follows Tokio's (possibly paused) time.
pub(crate) struct PausedClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl PausedClock {
    pub(crate) fn new() -> Self {
        Self {
            base: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.start.elapsed()).unwrap()
    }
}
