//! Demo HTTP API over a [`SessionManager`](crate::SessionManager).
//!
//! Each request is tied to a session through the session cookie; the first
//! request without one gets a `Set-Cookie` header.
//!
//! ## Endpoints
//!
//! ### Health & Info
//! - `GET /health` - Health check
//! - `GET /` - API information
//!
//! ### Session values
//! - `GET /session` - All values of the caller's session
//! - `POST /session` - Merge a JSON object into the session
//! - `GET /session/{key}` - Read one value
//! - `PUT /session/{key}` - Store one value (`{"value": .., "immutable": bool}`)
//! - `DELETE /session/{key}` - Remove one value
//! - `POST /session/clear` - Remove every value
//! - `POST /session/destroy` - Destroy the session and expire its cookie
//! - `POST /session/shift` - Extend the session by the configured TTL
//!
//! ### Flash messages
//! - `POST /flash/{key}` - Queue a message
//! - `GET /flash/{key}` - Read and consume a message
//!
//! ## Example
//!
//! ```no_run
//! use cookie_sessions::api::{serve, AppState, ServerConfig};
//! use cookie_sessions::{SessionConfig, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> cookie_sessions::Result<()> {
//!     let manager = SessionManager::new(SessionConfig::default())?;
//!     serve(ServerConfig::new("127.0.0.1", 8080), AppState::new(manager)).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;

// Re-export commonly used types
pub use handlers::AppState;
pub use router::{create_router, serve, ServerConfig};
pub use types::{ActionResponse, ErrorResponse, SessionResponse, SetValueRequest, ValueResponse};
