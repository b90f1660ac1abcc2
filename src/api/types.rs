//! API request and response types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Request to store one value.
#[derive(Debug, Clone, Deserialize)]
pub struct SetValueRequest {
    /// Value to store.
    pub value: serde_json::Value,
    /// Store a frozen copy instead of the value as given.
    #[serde(default)]
    pub immutable: bool,
}

/// Snapshot of the caller's session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    /// Session ID.
    pub session_id: String,
    /// Number of stored values.
    pub count: usize,
    /// Stored values, sorted by key.
    pub values: BTreeMap<String, serde_json::Value>,
    /// Whether unread flash messages are pending.
    pub has_flashes: bool,
    /// Seconds until expiration, if bounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
}

impl SessionResponse {
    pub fn from_session(session: &Session) -> Self {
        let values: BTreeMap<_, _> = session
            .get_all()
            .into_iter()
            .map(|(key, value)| (key, value.to_json()))
            .collect();

        Self {
            session_id: session.id().to_string(),
            count: values.len(),
            values,
            has_flashes: session.has_flashes(),
            expires_in_secs: session.lifetime().remaining().map(|d| d.as_secs()),
        }
    }
}

/// A single stored value.
#[derive(Debug, Clone, Serialize)]
pub struct ValueResponse {
    pub key: String,
    pub value: serde_json::Value,
}

/// Outcome of a mutating request.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    /// Session ID the action applied to.
    pub session_id: String,
    /// What was done (e.g., "deleted", "cleared").
    pub action: String,
    /// Whether the action changed anything.
    pub changed: bool,
}

impl ActionResponse {
    pub fn new(session_id: impl Into<String>, action: impl Into<String>, changed: bool) -> Self {
        Self {
            session_id: session_id.into(),
            action: action.into(),
            changed,
        }
    }
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "VALUE_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn value_not_found(key: &str) -> Self {
        Self::new("VALUE_NOT_FOUND", format!("No value stored under '{}'", key))
    }

    pub fn flash_not_found(key: &str) -> Self {
        Self::new("FLASH_NOT_FOUND", format!("No flash message under '{}'", key))
    }

    pub fn no_session() -> Self {
        Self::new("NO_SESSION", "Request does not carry a live session")
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }
}
