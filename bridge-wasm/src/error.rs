//! Error types for WebAssembly bridge implementations

use bridge_traits::error::BridgeError;
use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};

/// Result type for WebAssembly bridge operations
pub type WasmResult<T> = Result<T, WasmError>;

/// Errors raised while talking to browser APIs
#[derive(Error, Debug)]
pub enum WasmError {
    /// JavaScript exception from web-sys
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    /// A browser API is missing (no `window`, storage disabled, ...)
    #[error("Browser API not available: {0}")]
    NotAvailable(String),

    /// The Web Storage quota is exhausted
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),
}

impl From<WasmError> for BridgeError {
    fn from(err: WasmError) -> Self {
        match err {
            WasmError::NotAvailable(api) => BridgeError::NotAvailable(api),
            WasmError::QuotaExceeded(message) => BridgeError::Storage(message),
            WasmError::JavaScript(message) => BridgeError::OperationFailed(message),
        }
    }
}

impl From<JsValue> for WasmError {
    fn from(js_value: JsValue) -> Self {
        let message = js_message(&js_value);
        let is_quota = js_value
            .dyn_ref::<js_sys::Error>()
            .map(|error| String::from(error.name()) == "QuotaExceededError")
            .unwrap_or(false);
        if is_quota {
            WasmError::QuotaExceeded(message)
        } else {
            WasmError::JavaScript(message)
        }
    }
}

/// Converts a thrown JavaScript value into a [`BridgeError`] tagged with
/// the failing operation.
pub(crate) fn js_error(context: &str, err: JsValue) -> BridgeError {
    match WasmError::from(err) {
        WasmError::JavaScript(message) => {
            BridgeError::OperationFailed(format!("{context}: {message}"))
        }
        other => other.into(),
    }
}

fn js_message(js_value: &JsValue) -> String {
    if let Some(message) = js_value.as_string() {
        message
    } else if let Some(error) = js_value.dyn_ref::<js_sys::Error>() {
        error.message().into()
    } else {
        format!("{:?}", js_value)
    }
}
