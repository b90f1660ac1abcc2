//! cookie-sessions binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use cookie_sessions::api::{serve, AppState};
use cookie_sessions::cli::{self, parse_args};
use cookie_sessions::config::Config;
use cookie_sessions::{logging, MemoryDatabase, SessionManager};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'cookie-sessions --help' for more information.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::try_init_with_filter(config.log_filter()).ok();
    info!("cookie-sessions v{}", env!("CARGO_PKG_VERSION"));

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let server_config = config.to_server_config()?;
    let manager = SessionManager::new(config.to_session_config()?)?;
    manager.use_database(Arc::new(MemoryDatabase::new()));
    info!("Session manager initialized with in-memory database");

    serve(server_config, AppState::new(manager)).await?;
    Ok(())
}
