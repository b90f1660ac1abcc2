//! Cookie-backed session manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cookie::Cookie;
use http::HeaderMap;
use tracing::{debug, info, warn};

use super::gc::GarbageCollector;
use super::record::Session;
use super::registry::Registry;
use super::{Database, Expiry, LifeTime, SessionConfig, SessionId};
use crate::cookies::{
    add_cookie, cookie_domain, is_cookie_name, read_cookie, removal_cookie, request_host,
    unlimited_expiry,
};
use crate::error::{DatabaseError, Result, SessionError};

/// Issues session cookies and maps requests to their sessions.
///
/// Construct one per application and share it (for example behind an
/// `Arc` in your router state). Handlers call [`SessionManager::start`]
/// with the request and response headers and work with the returned
/// [`Session`].
pub struct SessionManager {
    config: SessionConfig,
    registry: Registry,
    gc: Mutex<Option<GarbageCollector>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("sessions", &self.registry.len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl SessionManager {
    /// Validate `config` and start the background collector.
    ///
    /// Fails with [`SessionError::Config`] when the cookie name is not a
    /// valid cookie token. Must be called from within a tokio runtime.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let config = config.validate();
        if !is_cookie_name(&config.cookie_name) {
            return Err(SessionError::Config(format!(
                "invalid cookie name {:?}",
                config.cookie_name
            )));
        }
        let registry = Registry::new(config.expires);
        let gc = GarbageCollector::spawn(&registry, config.gc_duration)?;

        info!(
            cookie = %config.cookie_name,
            expires = ?config.expires,
            gc_secs = config.gc_duration.as_secs(),
            "session manager started"
        );

        Ok(Self {
            config,
            registry,
            gc: Mutex::new(Some(gc)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mirror sessions to `db` from now on.
    pub fn use_database<D: Database + 'static>(&self, db: Arc<D>) {
        self.registry.register_database(db);
    }

    /// The session for this request, creating one and appending its
    /// `Set-Cookie` header to `response` when the request has none.
    pub fn start(&self, request: &HeaderMap, response: &mut HeaderMap) -> Session {
        if let Some(id) = self.session_id(request) {
            if self.registry.is_live(id.as_str()) || self.registry.has_backend_state(&id) {
                return self.registry.read_or_init(&id);
            }
        }

        let id = SessionId::generate(self.config.cookie_length);
        let session = self.registry.init(&id);
        self.write_cookie(request, response, &session);
        session
    }

    /// Expire the request's session cookie and destroy its session.
    pub fn destroy(&self, request: &HeaderMap, response: &mut HeaderMap) {
        let Some(id) = self.session_id(request) else {
            return;
        };
        let removal = removal_cookie(&self.config.cookie_name, self.domain_for(request));
        add_cookie(response, &removal);
        self.registry.destroy(id.as_str());
    }

    /// Destroy a session by id, for example from an admin endpoint. The
    /// client's cookie is left alone and will mint a new session.
    pub fn destroy_by_id(&self, id: &str) -> bool {
        self.registry.destroy(id)
    }

    pub fn destroy_all(&self) -> usize {
        self.registry.destroy_all()
    }

    /// Push the request's session expiration forward by the configured TTL
    /// and re-issue its cookie.
    ///
    /// Every database is notified; the first error is returned after the
    /// cookie has been written.
    pub fn shift_expiration(&self, request: &HeaderMap, response: &mut HeaderMap) -> Result<()> {
        let id = self
            .session_id(request)
            .filter(|id| self.registry.is_live(id.as_str()))
            .ok_or(SessionError::NoSession)?;

        let Some(ttl) = self.config.expires.ttl() else {
            return Ok(());
        };

        self.registry.set_lifetime(id.as_str(), LifeTime::after(ttl));

        let mut first_error: Option<DatabaseError> = None;
        for db in self.registry.databases() {
            if let Err(err) = db.on_update_expiration(&id, ttl) {
                warn!(session = %id, error = %err, "database rejected expiration update");
                first_error.get_or_insert(err);
            }
        }

        if let Some(session) = self.registry.get(id.as_str()) {
            self.write_cookie(request, response, &session);
        }
        debug!(session = %id, ttl_secs = ttl.as_secs(), "session expiration shifted");

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Number of sessions held in memory.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    /// Run a sweep now with the configured interval as the idle threshold.
    pub fn sweep(&self) -> usize {
        self.registry.sweep(self.config.gc_duration)
    }

    /// Stop the collector and wait for it, then close every database.
    pub async fn shutdown(&self) -> Result<()> {
        let gc = self.gc.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(gc) = gc {
            gc.shutdown().await;
        }
        self.close()
    }

    /// Stop the collector and close every database. Only the first call
    /// has any effect; it returns the first database error.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(gc) = self.gc.lock().unwrap_or_else(PoisonError::into_inner).take() {
            gc.stop();
        }

        let mut first_error = None;
        for db in self.registry.databases() {
            if let Err(err) = db.close() {
                warn!(error = %err, "failed to close session database");
                first_error.get_or_insert(err);
            }
        }

        info!(sessions = self.registry.len(), "session manager closed");
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Decoded session id carried by the request, if any. The id need not
    /// belong to a live session.
    pub fn session_id(&self, request: &HeaderMap) -> Option<SessionId> {
        let name = &self.config.cookie_name;
        let raw = read_cookie(request, name)?;
        if raw.is_empty() {
            return None;
        }

        let id = match &self.config.codec {
            Some(codec) => match codec.decode(name, &raw) {
                Ok(id) => id,
                Err(err) => {
                    warn!(cookie = %name, error = %err, "ignoring undecodable session cookie");
                    return None;
                }
            },
            None => raw,
        };
        (!id.is_empty()).then(|| SessionId::from(id))
    }

    fn domain_for(&self, request: &HeaderMap) -> Option<String> {
        if self.config.disable_subdomain_persistence {
            return None;
        }
        request_host(request).and_then(cookie_domain)
    }

    fn write_cookie(&self, request: &HeaderMap, response: &mut HeaderMap, session: &Session) {
        let name = &self.config.cookie_name;
        let value = match &self.config.codec {
            Some(codec) => match codec.encode(name, session.id().as_str()) {
                Ok(value) => value,
                Err(err) => {
                    warn!(cookie = %name, error = %err, "session cookie not written");
                    return;
                }
            },
            None => session.id().to_string(),
        };

        let mut cookie = Cookie::build((name.clone(), value))
            .path("/")
            .http_only(true);
        if let Some(domain) = self.domain_for(request) {
            cookie = cookie.domain(domain);
        }
        if self.config.expires != Expiry::BrowserSession {
            let expires_at = session
                .lifetime()
                .expires_at()
                .unwrap_or_else(unlimited_expiry);
            cookie = cookie.expires(expires_at);
        }

        add_cookie(response, &cookie.build());
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::session::{CookieCodec, MemoryDatabase, Value};
    use http::header::{COOKIE, HOST, SET_COOKIE};
    use http::HeaderValue;
    use std::time::Duration;

    fn set_cookies(response: &HeaderMap) -> Vec<Cookie<'static>> {
        response
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
            .collect()
    }

    fn request(host: &str, cookie: Option<&Cookie<'_>>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_str(host).unwrap());
        if let Some(cookie) = cookie {
            let pair = format!("{}={}", cookie.name(), cookie.value());
            headers.insert(COOKIE, HeaderValue::from_str(&pair).unwrap());
        }
        headers
    }

    #[tokio::test]
    async fn test_start_issues_cookie() {
        let manager = SessionManager::new(SessionConfig::default()).unwrap();
        let mut response = HeaderMap::new();
        let session = manager.start(&request("www.example.com:8080", None), &mut response);

        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 1);
        let cookie = &cookies[0];
        assert_eq!(cookie.name(), "sessionid");
        assert_eq!(cookie.value(), session.id().as_str());
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert!(cookie.expires_datetime().is_some());
    }

    #[tokio::test]
    async fn test_start_reuses_cookie_session() {
        let manager = SessionManager::new(SessionConfig::default()).unwrap();
        let mut response = HeaderMap::new();
        let first = manager.start(&request("localhost", None), &mut response);
        first.set("name", "gopher");
        let cookie = set_cookies(&response).remove(0);
        assert_eq!(cookie.domain(), None);

        let mut second_response = HeaderMap::new();
        let second = manager.start(&request("localhost", Some(&cookie)), &mut second_response);
        assert_eq!(second.id(), first.id());
        assert_eq!(second.get_string("name").unwrap(), "gopher");
        assert!(second_response.get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_unknown_cookie_mints_new_id() {
        let manager = SessionManager::new(SessionConfig::default()).unwrap();
        let forged = Cookie::new("sessionid", "not-a-session");
        let mut response = HeaderMap::new();
        let session = manager.start(&request("localhost", Some(&forged)), &mut response);

        assert_ne!(session.id().as_str(), "not-a-session");
        assert_eq!(set_cookies(&response).len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_then_start_mints_new_id() {
        let manager = SessionManager::new(SessionConfig::default()).unwrap();
        let mut response = HeaderMap::new();
        let first = manager.start(&request("example.com", None), &mut response);
        first.set("k", 1);
        let cookie = set_cookies(&response).remove(0);

        let mut destroy_response = HeaderMap::new();
        manager.destroy(&request("example.com", Some(&cookie)), &mut destroy_response);
        let removal = set_cookies(&destroy_response).remove(0);
        assert_eq!(removal.value(), "");
        assert_eq!(removal.max_age(), Some(time::Duration::ZERO));
        assert_eq!(removal.domain(), Some("example.com"));
        assert!(!manager.contains(first.id().as_str()));

        let mut next_response = HeaderMap::new();
        let next = manager.start(&request("example.com", Some(&cookie)), &mut next_response);
        assert_ne!(next.id(), first.id());
        assert!(next.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_without_cookie_is_noop() {
        let manager = SessionManager::new(SessionConfig::default()).unwrap();
        let mut response = HeaderMap::new();
        manager.destroy(&request("example.com", None), &mut response);
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_browser_session_cookie_has_no_expires() {
        let config = SessionConfig::default().with_expires(Expiry::BrowserSession);
        let manager = SessionManager::new(config).unwrap();
        let mut response = HeaderMap::new();
        manager.start(&request("localhost", None), &mut response);
        assert!(set_cookies(&response)[0].expires().is_none());
    }

    #[tokio::test]
    async fn test_subdomain_persistence_disabled() {
        let config = SessionConfig::default().without_subdomain_persistence();
        let manager = SessionManager::new(config).unwrap();
        let mut response = HeaderMap::new();
        manager.start(&request("www.example.com", None), &mut response);
        assert_eq!(set_cookies(&response)[0].domain(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry_mints_new_id() {
        let config = SessionConfig::default().with_expires(Expiry::After(Duration::from_millis(100)));
        let manager = SessionManager::new(config).unwrap();
        let mut response = HeaderMap::new();
        let first = manager.start(&request("localhost", None), &mut response);
        let cookie = set_cookies(&response).remove(0);

        let mut same = HeaderMap::new();
        let again = manager.start(&request("localhost", Some(&cookie)), &mut same);
        assert_eq!(again.id(), first.id());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut later = HeaderMap::new();
        let next = manager.start(&request("localhost", Some(&cookie)), &mut later);
        assert_ne!(next.id(), first.id());
        assert_eq!(set_cookies(&later).len(), 1);
    }

    #[tokio::test]
    async fn test_swept_session_rehydrates_from_database() {
        let manager = SessionManager::new(SessionConfig::default()).unwrap();
        let db = Arc::new(MemoryDatabase::new());
        manager.use_database(db.clone());

        let mut response = HeaderMap::new();
        let first = manager.start(&request("localhost", None), &mut response);
        first.set("cart", 3);
        let cookie = set_cookies(&response).remove(0);

        manager.registry().sweep(Duration::ZERO);
        assert!(manager.is_empty());

        let mut next_response = HeaderMap::new();
        let next = manager.start(&request("localhost", Some(&cookie)), &mut next_response);
        assert_eq!(next.id(), first.id());
        assert_eq!(next.get("cart"), Some(Value::Int(3)));
        assert!(next_response.get(SET_COOKIE).is_none());
    }

    struct Prefix;

    impl CookieCodec for Prefix {
        fn encode(&self, _: &str, id: &str) -> std::result::Result<String, CodecError> {
            Ok(format!("v1.{id}"))
        }

        fn decode(&self, _: &str, value: &str) -> std::result::Result<String, CodecError> {
            value
                .strip_prefix("v1.")
                .map(str::to_string)
                .ok_or_else(|| CodecError::new("unknown version"))
        }
    }

    #[tokio::test]
    async fn test_codec_round_trip() {
        let manager = SessionManager::new(SessionConfig::default().with_codec(Prefix)).unwrap();
        let mut response = HeaderMap::new();
        let first = manager.start(&request("localhost", None), &mut response);
        let cookie = set_cookies(&response).remove(0);
        assert_eq!(cookie.value(), format!("v1.{}", first.id()));

        let mut next_response = HeaderMap::new();
        let next = manager.start(&request("localhost", Some(&cookie)), &mut next_response);
        assert_eq!(next.id(), first.id());
    }

    #[tokio::test]
    async fn test_undecodable_cookie_is_ignored() {
        let manager = SessionManager::new(SessionConfig::default().with_codec(Prefix)).unwrap();
        let mut response = HeaderMap::new();
        let first = manager.start(&request("localhost", None), &mut response);

        let tampered = Cookie::new("sessionid", first.id().to_string());
        let mut next_response = HeaderMap::new();
        let next = manager.start(&request("localhost", Some(&tampered)), &mut next_response);
        assert_ne!(next.id(), first.id());
    }

    #[tokio::test]
    async fn test_shift_expiration() {
        let config = SessionConfig::default().with_expires(Expiry::After(Duration::from_secs(60)));
        let manager = SessionManager::new(config).unwrap();
        let db = Arc::new(MemoryDatabase::new());
        manager.use_database(db);

        let mut response = HeaderMap::new();
        let session = manager.start(&request("localhost", None), &mut response);
        let cookie = set_cookies(&response).remove(0);
        let before = session.lifetime().expires_at().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut shifted = HeaderMap::new();
        manager
            .shift_expiration(&request("localhost", Some(&cookie)), &mut shifted)
            .unwrap();

        assert!(session.lifetime().expires_at().unwrap() > before);
        assert_eq!(set_cookies(&shifted).len(), 1);
    }

    #[tokio::test]
    async fn test_shift_expiration_without_session() {
        let manager = SessionManager::new(SessionConfig::default()).unwrap();
        let mut response = HeaderMap::new();
        let err = manager
            .shift_expiration(&request("localhost", None), &mut response)
            .unwrap_err();
        assert!(matches!(err, SessionError::NoSession));
    }

    #[tokio::test]
    async fn test_close_closes_databases_once() {
        let manager = SessionManager::new(SessionConfig::default()).unwrap();
        let db = Arc::new(MemoryDatabase::new());
        manager.use_database(db.clone());

        manager.close().unwrap();
        assert!(db.is_closed());
        // Second close is a no-op rather than a double close.
        manager.close().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown() {
        let manager = SessionManager::new(SessionConfig::default()).unwrap();
        manager.shutdown().await.unwrap();
    }

    #[test]
    fn test_requires_runtime() {
        let err = SessionManager::new(SessionConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::RuntimeUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_cookie_name() {
        for name in ["bad name", "sid;path", "a=b"] {
            let err = SessionManager::new(SessionConfig::new(name)).unwrap_err();
            assert!(matches!(err, SessionError::Config(_)), "{name}");
        }

        let encoded = SessionConfig::new("bad name").with_encoded_cookie_name();
        assert!(SessionManager::new(encoded).is_ok());
    }
}
