//! Configuration management for the cookie-sessions server.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ServerConfig;
use crate::cli::Args;
use crate::cookies::is_cookie_name;
use crate::session::{Expiry, SessionConfig, DEFAULT_COOKIE_NAME, DEFAULT_GC_DURATION};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Session configuration.
    pub session: SessionSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable graceful shutdown.
    pub graceful_shutdown: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            graceful_shutdown: true,
        }
    }
}

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Session cookie name.
    pub cookie: String,
    /// Random bytes per session id.
    pub cookie_length: usize,
    /// Lifetime in seconds: 0 unlimited, negative browser-session.
    pub ttl_secs: i64,
    /// Sweep interval in seconds.
    pub gc_secs: u64,
    /// Share the cookie with sibling subdomains.
    pub subdomains: bool,
    /// Base64url-encode the cookie name.
    pub encode_cookie_name: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            cookie: DEFAULT_COOKIE_NAME.to_string(),
            cookie_length: 32,
            ttl_secs: 0,
            gc_secs: DEFAULT_GC_DURATION.as_secs(),
            subdomains: true,
            encode_cookie_name: false,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup. Unparseable numbers are
    /// ignored.
    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("COOKIE_SESSIONS_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("COOKIE_SESSIONS_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        if let Some(cookie) = var("COOKIE_SESSIONS_COOKIE") {
            if !cookie.is_empty() {
                self.session.cookie = cookie;
            }
        }

        if let Some(ttl) = var("COOKIE_SESSIONS_TTL_SECS").and_then(|t| t.parse().ok()) {
            self.session.ttl_secs = ttl;
        }

        if let Some(gc) = var("COOKIE_SESSIONS_GC_SECS").and_then(|g| g.parse().ok()) {
            self.session.gc_secs = gc;
        }

        if let Some(level) = var("COOKIE_SESSIONS_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        self.server.host = args.host.to_string();
        self.server.port = args.port;

        if let Some(ref cookie) = args.cookie {
            self.session.cookie = cookie.clone();
        }

        if let Some(ttl) = args.ttl {
            self.session.ttl_secs = ttl;
        }

        if let Some(gc) = args.gc {
            self.session.gc_secs = gc;
        }

        if args.no_subdomains {
            self.session.subdomains = false;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Convert to the session manager configuration.
    pub fn to_session_config(&self) -> Result<SessionConfig, ConfigError> {
        if !self.session.cookie.is_empty() && !is_cookie_name(&self.session.cookie) {
            return Err(ConfigError::InvalidCookieName(self.session.cookie.clone()));
        }

        let mut config = SessionConfig::new(&self.session.cookie)
            .with_cookie_length(self.session.cookie_length)
            .with_expires(Expiry::from_secs(self.session.ttl_secs))
            .with_gc_duration(Duration::from_secs(self.session.gc_secs));

        if !self.session.subdomains {
            config = config.without_subdomain_persistence();
        }
        if self.session.encode_cookie_name {
            config = config.with_encoded_cookie_name();
        }

        Ok(config)
    }

    /// Convert to ServerConfig for the API server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        let mut server_config = ServerConfig::new(host.to_string(), self.server.port);
        if !self.server.graceful_shutdown {
            server_config = server_config.without_graceful_shutdown();
        }

        Ok(server_config)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
    /// Cookie name with characters not allowed in a cookie.
    InvalidCookieName(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::InvalidCookieName(name) => write!(f, "invalid cookie name: {:?}", name),
        }
    }
}

impl std::error::Error for ConfigError {}
