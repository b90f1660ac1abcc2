//! Reading and writing cookies on `http` header maps.

use cookie::Cookie;
use http::header::{COOKIE, HOST, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use time::{Duration, OffsetDateTime};
use tracing::warn;

use crate::session::EXPIRE_IMMEDIATELY;

/// How far ahead an "unlimited" cookie expires: about 24 years, 10 months
/// and 10 days.
const UNLIMITED_LIFETIME: Duration = Duration::days(24 * 365 + 10 * 30 + 10);

/// Expiration instant written for cookies that should never expire.
pub fn unlimited_expiry() -> OffsetDateTime {
    OffsetDateTime::now_utc() + UNLIMITED_LIFETIME
}

/// Value of the first cookie called `name` in the request's `Cookie`
/// headers. Missing and malformed headers read as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

/// Append a `Set-Cookie` header. Cookies that do not form a valid header
/// value are dropped with a warning.
pub fn add_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(err) => warn!(cookie = cookie.name(), error = %err, "dropping unencodable cookie"),
    }
}

/// A cookie instructing the browser to delete `name` right away.
pub fn removal_cookie(name: &str, domain: Option<String>) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), String::new()))
        .path("/")
        .http_only(true)
        .max_age(Duration::ZERO)
        .expires(EXPIRE_IMMEDIATELY);
    if let Some(domain) = domain {
        builder = builder.domain(domain);
    }
    builder.build()
}

/// Whether `name` is a cookie-name token: non-empty visible ASCII without
/// separators.
pub fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}

/// The request's `Host` header, if present and valid UTF-8.
pub fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers.get(HOST).and_then(|value| value.to_str().ok())
}
