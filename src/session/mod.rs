//! Session management module.
//!
//! This module provides the session registry, the per-session handle and
//! value types, background expiration, and the cookie-facing manager.

mod config;
mod database;
mod gc;
mod id;
mod lifetime;
mod manager;
mod record;
mod registry;
mod value;

pub use config::{
    CookieCodec, Expiry, SessionConfig, DEFAULT_COOKIE_LENGTH, DEFAULT_COOKIE_NAME,
    DEFAULT_GC_DURATION,
};
pub use database::{Database, MemoryDatabase};
pub use gc::GarbageCollector;
pub use id::SessionId;
pub use lifetime::{LifeTime, EXPIRE_IMMEDIATELY};
pub use manager::SessionManager;
pub use record::Session;
pub use registry::Registry;
pub use value::{SharedValue, Value};
