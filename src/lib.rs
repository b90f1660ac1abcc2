//! # cookie-sessions
//!
//! Cookie-issued, in-memory server-side sessions with pluggable backing
//! stores.
//!
//! A [`SessionManager`] hands each client an opaque session id through a
//! cookie and keeps the session's values in process memory. Registered
//! [`Database`]s mirror every change so sessions survive memory sweeps and
//! restarts. Sessions expire after a configurable lifetime and idle ones
//! are swept in the background.
//!
//! ## Features
//!
//! - **Framework neutral**: works on `http::HeaderMap`s, so any `http` 1.x
//!   server can use it
//! - **Subdomain sharing**: the cookie `Domain` is widened by one label
//! - **Typed values**: fallible coercing getters, counters, flash messages
//! - **Background expiry**: per-session timers plus a periodic idle sweep
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cookie_sessions::{Expiry, MemoryDatabase, SessionConfig, SessionManager};
//! use http::HeaderMap;
//!
//! #[tokio::main]
//! async fn main() -> cookie_sessions::Result<()> {
//!     cookie_sessions::logging::try_init().ok();
//!
//!     let config = SessionConfig::default().with_expires(Expiry::After(Duration::from_secs(1800)));
//!     let manager = SessionManager::new(config)?;
//!     manager.use_database(Arc::new(MemoryDatabase::new()));
//!
//!     let request = HeaderMap::new();
//!     let mut response = HeaderMap::new();
//!     let session = manager.start(&request, &mut response);
//!     session.set("user", "gopher");
//!
//!     println!("session {} issued", session.id());
//!     manager.shutdown().await
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod cookies;
pub mod error;
pub mod logging;
pub mod session;

// Re-export commonly used types
pub use error::{CodecError, DatabaseError, Result, SessionError};
pub use session::{
    CookieCodec, Database, Expiry, GarbageCollector, LifeTime, MemoryDatabase, Registry, Session,
    SessionConfig, SessionId, SessionManager, SharedValue, Value,
};
