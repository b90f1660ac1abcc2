//! API router configuration.

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::handlers::{
    api_info, clear_session, delete_value, destroy_session, get_flash, get_session, get_value,
    health, merge_values, put_value, set_flash, shift_expiration, AppState,
};
use crate::error::SessionError;

/// Create the API router over an existing manager.
pub fn create_router(state: AppState) -> Router {
    let session_routes = Router::new()
        .route("/", get(get_session).post(merge_values))
        .route("/clear", post(clear_session))
        .route("/destroy", post(destroy_session))
        .route("/shift", post(shift_expiration))
        .route(
            "/{key}",
            get(get_value).put(put_value).delete(delete_value),
        );

    Router::new()
        .route("/", get(api_info))
        .route("/health", get(health))
        .route("/flash/{key}", get(get_flash).post(set_flash))
        .nest("/session", session_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Finish in-flight requests on Ctrl-C instead of exiting at once.
    pub graceful_shutdown: bool,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            graceful_shutdown: true,
        }
    }

    pub fn without_graceful_shutdown(mut self) -> Self {
        self.graceful_shutdown = false;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 8080)
    }
}

/// Serve the API until the listener fails or, with graceful shutdown,
/// until Ctrl-C. The manager is shut down before returning.
pub async fn serve(config: ServerConfig, state: AppState) -> crate::Result<()> {
    let addr = config.bind_address();
    let manager = state.manager.clone();
    let router = create_router(state);

    tracing::info!("Starting cookie-sessions API server on {}", addr);

    let listener = TcpListener::bind(&addr).await.map_err(SessionError::Io)?;

    let served = if config.graceful_shutdown {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    } else {
        axum::serve(listener, router).await
    };
    served.map_err(SessionError::Io)?;

    manager.shutdown().await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
