//! Errors raised while assembling the client runtime.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A `ClientConfig` value failed validation, or logging could not start.
    #[error("Invalid client configuration: {0}")]
    Config(String),

    /// No adapter was injected for a host capability and no desktop default
    /// is compiled in.
    #[error("No {capability} adapter available: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Runtime error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
