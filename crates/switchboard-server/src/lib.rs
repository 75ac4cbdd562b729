//! Switchboard Server - Inter-agent Messaging Backend
//!
//! A standalone Rust backend server for the Switchboard platform, providing:
//! - RESTful HTTP API via axum for messaging, allowlists and workflows
//! - A per-tenant realtime WebSocket channel with catch-up replay
//! - SQLite persistence and an in-process job queue via `switchboard-core`
//!
//! This crate can be used standalone or embedded in other applications
//! (e.g., the `switchboard` CLI).

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use switchboard_core::audit::TracingAuditSink;
use switchboard_core::auth::TokenVerifier;
use switchboard_core::queue::{JobDispatcher, TokioJobQueue};
use switchboard_core::state::{AppState, AppStateInner};
use switchboard_core::{CoreConfig, Database};

/// Configuration for the Switchboard backend server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    /// HS256 secret used to verify bearer tokens.
    pub jwt_secret: String,
    pub core: CoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3210,
            db_path: "switchboard.db".to_string(),
            jwt_secret: "dev-secret".to_string(),
            core: CoreConfig::default(),
        }
    }
}

/// Create a shared `AppState` and start its job dispatcher.
///
/// Must be called from within a tokio runtime. Built-in workflow templates
/// are installed on every call.
pub async fn create_app_state(config: &ServerConfig) -> Result<AppState, String> {
    let db = Database::open(&config.db_path)
        .map_err(|e| format!("Failed to open database: {}", e))?;

    let (queue, jobs) = TokioJobQueue::new();
    let state: AppState = Arc::new(AppStateInner::new(
        db,
        config.core.clone(),
        Arc::new(queue),
        Arc::new(TracingAuditSink),
        TokenVerifier::new(&config.jwt_secret),
    ));

    JobDispatcher::new(jobs, Arc::new(state.job_runner())).spawn();

    state
        .orchestrator
        .install_builtin_templates()
        .await
        .map_err(|e| format!("Failed to install built-in templates: {}", e))?;

    Ok(state)
}

/// The full application router, with CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the Switchboard backend server.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    init_tracing();

    tracing::info!(
        "Starting Switchboard backend server on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state(&config).await?;

    start_server_with_state(config, state).await
}

/// Start the HTTP server with a pre-built `AppState`.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("Switchboard backend server listening on {}", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

/// Install the global `tracing` subscriber. A second call is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "switchboard_server=info,switchboard_core=info,tower_http=info".into()
            }),
        )
        .try_init();
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "switchboard-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
