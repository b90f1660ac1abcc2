//! Error types for cookie-sessions.

use thiserror::Error;

/// Main error type for session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No value is stored under the requested key.
    #[error("session value not found: {0}")]
    ValueNotFound(String),

    /// A stored value could not be read as the requested type.
    #[error("unable to read {key:?} as {expected}: found {found}")]
    Coercion {
        key: String,
        expected: &'static str,
        found: String,
    },

    /// The request does not carry a live session.
    #[error("no active session for this request")]
    NoSession,

    /// The manager was constructed outside a tokio runtime.
    #[error("tokio runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The configuration cannot be used to issue cookies.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Backing store error.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a [`Database`](crate::Database) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// The backend holds no entry for the session.
    #[error("session {0} not found in database")]
    NotFound(String),

    /// The backend does not support the operation.
    #[error("operation not implemented by this database")]
    NotImplemented,

    /// The backend was already closed.
    #[error("database closed")]
    Closed,

    /// Backend-specific failure.
    #[error("database error: {0}")]
    Backend(String),
}

/// Error returned by a [`CookieCodec`](crate::CookieCodec) hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cookie codec error: {0}")]
pub struct CodecError(pub String);

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Convenience Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
