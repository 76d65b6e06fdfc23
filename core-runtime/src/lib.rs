//! # Core Runtime Module
//!
//! Foundational infrastructure shared by the docflow client crates:
//! - Logging and tracing setup
//! - Client configuration with fail-fast validation
//! - Event bus for auth and request notifications
//!
//! Nothing here knows about tokens; `core-auth` builds on these pieces.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus, EventStream, RequestEvent};
