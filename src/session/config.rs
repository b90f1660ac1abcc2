//! Session manager configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::CodecError;

/// Cookie name used when none is configured.
pub const DEFAULT_COOKIE_NAME: &str = "sessionid";

/// Number of random bytes in a session id.
pub const DEFAULT_COOKIE_LENGTH: usize = 32;

/// Interval between garbage collection sweeps.
pub const DEFAULT_GC_DURATION: Duration = Duration::from_secs(2 * 60 * 60);

/// Lifetime policy for the session cookie and its server-side record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Cookie never expires in practice; the record lives until destroyed
    /// or swept.
    #[default]
    Unlimited,
    /// Cookie without `Expires`, dropped by the browser when it closes.
    /// The record is only reclaimed by the sweep.
    BrowserSession,
    /// Cookie and record expire this long after creation.
    After(Duration),
}

impl Expiry {
    /// Map a signed TTL in seconds: `0` is unlimited, negative is
    /// browser-session, positive is a duration.
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            0 => Expiry::Unlimited,
            s if s < 0 => Expiry::BrowserSession,
            s => Expiry::After(Duration::from_secs(s.unsigned_abs())),
        }
    }

    /// Inverse of [`Expiry::from_secs`].
    pub fn as_secs(&self) -> i64 {
        match self {
            Expiry::Unlimited => 0,
            Expiry::BrowserSession => -1,
            Expiry::After(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// The bounded TTL, if any.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            Expiry::After(d) => Some(*d),
            _ => None,
        }
    }
}

/// Hook pair transforming the session id on its way to and from the cookie.
///
/// Implement this to sign or encrypt cookie values. Failures never reach
/// the request handler: a failed encode drops the cookie, a failed decode
/// is treated as a missing cookie.
pub trait CookieCodec: Send + Sync {
    /// Turn a plain session id into the value written to the cookie.
    fn encode(&self, cookie_name: &str, session_id: &str) -> Result<String, CodecError>;

    /// Recover the plain session id from a cookie value.
    fn decode(&self, cookie_name: &str, cookie_value: &str) -> Result<String, CodecError>;
}

/// Configuration for a [`SessionManager`](crate::SessionManager).
#[derive(Clone)]
pub struct SessionConfig {
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Random bytes per session id.
    pub cookie_length: usize,
    /// Cookie and record lifetime policy.
    pub expires: Expiry,
    /// Sweep interval; records idle longer than this are evicted from memory.
    pub gc_duration: Duration,
    /// Keep the cookie on the exact request host instead of sharing it
    /// with sibling subdomains.
    pub disable_subdomain_persistence: bool,
    /// Base64url-encode the cookie name once at validation.
    pub encode_cookie_name: bool,
    /// Optional cookie value transformation.
    pub codec: Option<Arc<dyn CookieCodec>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_length: DEFAULT_COOKIE_LENGTH,
            expires: Expiry::Unlimited,
            gc_duration: DEFAULT_GC_DURATION,
            disable_subdomain_persistence: false,
            encode_cookie_name: false,
            codec: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_name", &self.cookie_name)
            .field("cookie_length", &self.cookie_length)
            .field("expires", &self.expires)
            .field("gc_duration", &self.gc_duration)
            .field(
                "disable_subdomain_persistence",
                &self.disable_subdomain_persistence,
            )
            .field("encode_cookie_name", &self.encode_cookie_name)
            .field("codec", &self.codec.is_some())
            .finish()
    }
}

impl SessionConfig {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            ..Default::default()
        }
    }

    pub fn with_cookie_length(mut self, len: usize) -> Self {
        self.cookie_length = len;
        self
    }

    pub fn with_expires(mut self, expires: Expiry) -> Self {
        self.expires = expires;
        self
    }

    pub fn with_gc_duration(mut self, interval: Duration) -> Self {
        self.gc_duration = interval;
        self
    }

    pub fn without_subdomain_persistence(mut self) -> Self {
        self.disable_subdomain_persistence = true;
        self
    }

    pub fn with_encoded_cookie_name(mut self) -> Self {
        self.encode_cookie_name = true;
        self
    }

    pub fn with_codec(mut self, codec: impl CookieCodec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Fill in defaults for missing fields and apply the cookie name
    /// encoding.
    ///
    /// Meant to run once; the manager calls it at construction.
    pub fn validate(mut self) -> Self {
        if self.cookie_name.is_empty() {
            self.cookie_name = DEFAULT_COOKIE_NAME.to_string();
        }

        if self.encode_cookie_name {
            self.cookie_name = URL_SAFE_NO_PAD.encode(self.cookie_name.as_bytes());
            self.encode_cookie_name = false;
        }

        if self.cookie_length == 0 {
            self.cookie_length = DEFAULT_COOKIE_LENGTH;
        }

        if self.gc_duration.is_zero() {
            self.gc_duration = DEFAULT_GC_DURATION;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Reverse;

    impl CookieCodec for Reverse {
        fn encode(&self, _: &str, id: &str) -> Result<String, CodecError> {
            Ok(id.chars().rev().collect())
        }

        fn decode(&self, _: &str, value: &str) -> Result<String, CodecError> {
            Ok(value.chars().rev().collect())
        }
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.cookie_name, DEFAULT_COOKIE_NAME);
        assert_eq!(config.cookie_length, 32);
        assert_eq!(config.expires, Expiry::Unlimited);
        assert!(config.codec.is_none());
    }

    #[test]
    fn test_validate_fills_defaults() {
        let config = SessionConfig::new("")
            .with_cookie_length(0)
            .with_gc_duration(Duration::ZERO)
            .validate();

        assert_eq!(config.cookie_name, DEFAULT_COOKIE_NAME);
        assert_eq!(config.cookie_length, DEFAULT_COOKIE_LENGTH);
        assert_eq!(config.gc_duration, DEFAULT_GC_DURATION);
    }

    #[test]
    fn test_validate_encodes_name_once() {
        let config = SessionConfig::new("mysessionid")
            .with_encoded_cookie_name()
            .validate();
        assert_eq!(config.cookie_name, "bXlzZXNzaW9uaWQ");

        // A second pass must not re-encode.
        let again = config.validate();
        assert_eq!(again.cookie_name, "bXlzZXNzaW9uaWQ");
    }

    #[test]
    fn test_expiry_from_secs() {
        assert_eq!(Expiry::from_secs(0), Expiry::Unlimited);
        assert_eq!(Expiry::from_secs(-1), Expiry::BrowserSession);
        assert_eq!(
            Expiry::from_secs(7200),
            Expiry::After(Duration::from_secs(7200))
        );
        assert_eq!(Expiry::from_secs(30).as_secs(), 30);
        assert_eq!(Expiry::BrowserSession.ttl(), None);
    }

    #[test]
    fn test_codec_builder() {
        let config = SessionConfig::default().with_codec(Reverse);
        let codec = config.codec.as_ref().unwrap();
        assert_eq!(codec.encode("n", "abc").unwrap(), "cba");
        assert_eq!(codec.decode("n", "cba").unwrap(), "abc");
        assert!(format!("{:?}", config).contains("codec: true"));
    }
}
