//! Session cookie helpers.
//!
//! Domain scoping decides which hosts share a session cookie; the header
//! helpers move cookies in and out of `http::HeaderMap`s so the manager
//! stays independent of any particular web framework.

mod header;
mod scope;

pub use header::{
    add_cookie, is_cookie_name, read_cookie, removal_cookie, request_host, unlimited_expiry,
};
pub use scope::{cookie_domain, host_without_port, is_eligible_domain, widen_to_parent_domain};
