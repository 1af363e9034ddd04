use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

pub mod error;
pub mod routes;
pub mod state;

use crate::config::{Config, ServerConfig};
use routes::{
    delete_handler, library_handler, pin_handler, play_handler, today_handler,
    today_info_handler, upload_handler, user_handler,
};
use state::{AppState, SharedState};

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let upload_limit = DefaultBodyLimit::max(state.server.upload_limit);

    Router::new()
        .route("/", get(user_handler))
        .route("/espen", get(library_handler))
        .route("/espen/today", get(today_handler))
        .route("/espen/today/info", get(today_info_handler))
        .route("/espen/play/{filename}", get(play_handler))
        .route("/espen/upload", post(upload_handler).layer(upload_limit))
        .route("/espen/delete", post(delete_handler))
        .route("/espen/pin/{id}", post(pin_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(config: Config, server: ServerConfig) -> Result<()> {
    info!("Initializing state...");
    let state = AppState::new(config, server)?;
    let (videos, store) = state.resolver.describe();
    info!(%videos, %store, tz = %state.config.time_zone, "Video library ready");

    info!("Starting server...");
    let app = router(Arc::clone(&state));

    let address = format!("0.0.0.0:{}", state.server.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
