/// Error taxonomy for extraction, relay and insertion
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wasm_bindgen::JsValue;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum RelayError {
    /// Non-2xx response, timeout or connection failure
    #[error("request to {url} failed{}", status_suffix(.status))]
    Network { url: String, status: Option<u16> },

    /// Malformed embedded data or a missing field
    #[error("parse failure: {0}")]
    Parse(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("storage failure: {0}")]
    Storage(String),

    /// Content script <-> background exchange failed or was refused
    #[error("messaging failure: {0}")]
    Messaging(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {}", s)).unwrap_or_default()
}

impl RelayError {
    /// Errors that are absorbed locally (fall through, retry) rather than
    /// shown to the user.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RelayError::Network { .. } | RelayError::Parse(_) | RelayError::ElementNotFound(_)
        )
    }
}

/// Why a button click did not result in a hand-off
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransferError {
    #[error("no game notation found on this page")]
    NothingFound,
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl TransferError {
    /// Text for the on-page notification
    pub fn user_message(&self) -> String {
        match self {
            TransferError::NothingFound => "No game notation found on this page".to_string(),
            TransferError::Relay(e) => format!("Could not send the game for analysis: {}", e),
        }
    }
}

/// Format a JS exception the way the bridge reports it.
pub fn js_error(e: &JsValue) -> String {
    e.as_string().unwrap_or_else(|| format!("{:?}", e))
}
