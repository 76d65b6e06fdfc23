use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Why a refresh episode failed.
///
/// Cloned to every caller waiting on the episode, so it carries strings
/// rather than source errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh token rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("refresh request failed: {0}")]
    Network(String),

    #[error("refresh timed out after {} ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("token storage failed: {0}")]
    Storage(String),
}

#[derive(Error, Debug)]
pub enum AuthError {
    /// The session could not be renewed and the tokens were cleared.
    #[error("Session ended: {0}")]
    SessionEnded(RefreshFailure),

    /// The refresh episode stopped without a verdict because the session
    /// was replaced mid-refresh. Tokens are untouched.
    #[error("Token refresh interrupted: {0}")]
    RefreshInterrupted(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] BridgeError),

    #[error("Token storage unavailable: {0}")]
    Storage(String),

    /// An auth endpoint (login, signup) refused the request.
    #[error("{endpoint} rejected with status {status}: {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),
}

impl AuthError {
    /// True when the host should send the user to the login screen.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, AuthError::SessionEnded(_))
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
