//! CourseChat Server Library
//!
//! Direct messages between operators and learners: a durable message
//! store behind a small HTTP API, plus an identity-addressed WebSocket
//! channel that pushes new messages to every open session of both parties.

pub mod auth;
pub mod config;
pub mod ctx;
pub mod db;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod live;
pub mod store;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::middleware::mw_require_auth;
use config::{AppState, ChatServerConfig};
use handlers::{get_messages, list_users, login, logout, me, post_message, signup};
use live::live_socket;

/// Install the global fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        // Already set, ignore
    }
}

/// Build the full router over `state`
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/users", get(list_users))
        .route("/messages", post(post_message))
        .route("/messages/{peer_id}", get(get_messages))
        .route_layer(middleware::from_fn_with_state(state.clone(), mw_require_auth));

    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        // Authenticates its own upgrade (token query parameter)
        .route("/live", get(live_socket))
        .route("/health", get(health_check))
        .merge(protected)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Serve on an already-bound listener until the process stops
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("=== CourseChat Server ===");

    let config = ChatServerConfig::from_env();
    info!("Storage directory: {:?}", config.root_dir);
    info!("Database: {:?}", config.db_path);

    let state = AppState::new(&config).await?;

    let listener = TcpListener::bind(config.addr).await?;
    info!("CourseChat server listening on http://{}", listener.local_addr()?);

    serve(listener, state).await
}

async fn health_check() -> &'static str {
    "OK - CourseChat Server"
}
