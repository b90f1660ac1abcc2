//! Command-line interface for the cookie-sessions demo server.
//!
//! Uses lexopt to keep the binary small.

use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone)]
pub struct Args {
    /// Host address to bind to.
    pub host: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Session cookie name.
    pub cookie: Option<String>,
    /// Session TTL in seconds: 0 unlimited, negative browser-session.
    pub ttl: Option<i64>,
    /// Garbage collection interval in seconds.
    pub gc: Option<u64>,
    /// Keep cookies on the exact request host.
    pub no_subdomains: bool,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            config: None,
            cookie: None,
            ttl: None,
            gc: None,
            no_subdomains: false,
            log_level: None,
            version: false,
            help: false,
        }
    }
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                let value: String = parser.value()?.parse()?;
                result.host = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("host", value))?;
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("port", value))?;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Long("cookie") => {
                result.cookie = Some(parser.value()?.parse()?);
            }
            Long("ttl") => {
                let value: String = parser.value()?.parse()?;
                result.ttl = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("ttl", value))?,
                );
            }
            Long("gc") => {
                let value: String = parser.value()?.parse()?;
                result.gc = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("gc", value))?,
                );
            }
            Long("no-subdomains") => {
                result.no_subdomains = true;
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"cookie-sessions {version}
Cookie-backed server-side session store with a demo HTTP API

USAGE:
    cookie-sessions [OPTIONS]

OPTIONS:
    -H, --host <ADDR>       Host address to bind [default: 127.0.0.1]
    -p, --port <PORT>       Port to listen on [default: 8080]
    -c, --config <FILE>     Path to configuration file (JSON)
        --cookie <NAME>     Session cookie name [default: sessionid]
        --ttl <SECS>        Session lifetime; 0 unlimited, negative browser-session
        --gc <SECS>         Idle sweep interval [default: 7200]
        --no-subdomains     Do not share the cookie with subdomains
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    COOKIE_SESSIONS_HOST       Host address (overrides config)
    COOKIE_SESSIONS_PORT       Port number (overrides config)
    COOKIE_SESSIONS_COOKIE     Cookie name (overrides config)
    COOKIE_SESSIONS_TTL_SECS   Session lifetime (overrides config)
    COOKIE_SESSIONS_GC_SECS    Sweep interval (overrides config)
    COOKIE_SESSIONS_LOG_LEVEL  Log level (overrides config)
    RUST_LOG                   Alternative log level setting

EXAMPLES:
    # Start with defaults (localhost:8080, unlimited sessions)
    cookie-sessions

    # Sessions expire after 30 minutes
    cookie-sessions --ttl 1800

    # Start with config file
    cookie-sessions -c /etc/cookie-sessions/config.json
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("cookie-sessions {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<OsString> {
        std::iter::once("cookie-sessions")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_default_args() {
        let result = parse_args_from(args(&[])).unwrap();
        assert_eq!(result.host.to_string(), "127.0.0.1");
        assert_eq!(result.port, 8080);
        assert!(!result.no_subdomains);
        assert_eq!(result.ttl, None);
    }

    #[test]
    fn test_host_port() {
        let result = parse_args_from(args(&["-H", "0.0.0.0", "-p", "9000"])).unwrap();
        assert_eq!(result.host.to_string(), "0.0.0.0");
        assert_eq!(result.port, 9000);
    }

    #[test]
    fn test_session_options() {
        let result = parse_args_from(args(&[
            "--cookie",
            "sid",
            "--ttl",
            "1800",
            "--gc",
            "60",
            "--no-subdomains",
        ]))
        .unwrap();
        assert_eq!(result.cookie.as_deref(), Some("sid"));
        assert_eq!(result.ttl, Some(1800));
        assert_eq!(result.gc, Some(60));
        assert!(result.no_subdomains);
    }

    #[test]
    fn test_negative_ttl() {
        let result = parse_args_from(args(&["--ttl", "-1"])).unwrap();
        assert_eq!(result.ttl, Some(-1));

        let result = parse_args_from(args(&["--ttl=-1"])).unwrap();
        assert_eq!(result.ttl, Some(-1));
    }

    #[test]
    fn test_config_file() {
        let result = parse_args_from(args(&["-c", "/etc/config.json"])).unwrap();
        assert_eq!(result.config, Some(PathBuf::from("/etc/config.json")));
    }

    #[test]
    fn test_help_and_version_flags() {
        assert!(parse_args_from(args(&["-h"])).unwrap().help);
        assert!(parse_args_from(args(&["--help"])).unwrap().help);
        assert!(parse_args_from(args(&["-V"])).unwrap().version);
        assert!(parse_args_from(args(&["--version"])).unwrap().version);
    }

    #[test]
    fn test_log_level() {
        let result = parse_args_from(args(&["-l", "debug"])).unwrap();
        assert_eq!(result.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_invalid_values() {
        assert!(parse_args_from(args(&["-p", "invalid"])).is_err());
        assert!(parse_args_from(args(&["-H", "not-an-ip"])).is_err());
        assert!(parse_args_from(args(&["--ttl", "soon"])).is_err());
        assert!(parse_args_from(args(&["--gc", "-5"])).is_err());
    }

    #[test]
    fn test_unexpected_argument() {
        let err = parse_args_from(args(&["serve"])).unwrap_err();
        assert!(matches!(err, ArgsError::UnexpectedArgument(_)));
    }
}
