//! HTTP surface: every GET, whatever the path, returns the current snapshot.
//!
//! Handlers only read the cache and format, so they never wait on a fetch.
//! The response is always `200 OK` with `application/json`; feeds that have
//! never been fetched are simply missing from the object.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{OriginalUri, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Local;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::app::App;

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/", get(snapshot))
        .route("/{*path}", get(snapshot))
        .with_state(app)
}

async fn snapshot(
    State(app): State<Arc<App>>,
    OriginalUri(uri): OriginalUri,
) -> Json<Map<String, Value>> {
    debug!(path = uri.path(), "serving snapshot");
    Json(app.snapshot(Local::now()))
}

/// Serve until Ctrl-C.
pub async fn serve(app: Arc<App>, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router(app))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
