//! HTTP surface of the item cache.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{ITEMS_PATH, ItemsBody};
use crate::cache::ItemCache;

/// Build the router. The cache instance is owned by the router state.
pub fn router(cache: Arc<ItemCache>) -> Router {
    Router::new()
        .route(ITEMS_PATH, get(get_items))
        .route("/healthz", get(healthz))
        .with_state(cache)
}

async fn get_items(State(cache): State<Arc<ItemCache>>) -> impl IntoResponse {
    let (status, body) = ItemsBody::from_outcome(cache.get().await);
    debug!("GET {} -> {} ({} item(s))", ITEMS_PATH, status, body.data.len());

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Serve the cache endpoint on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    cache: Arc<ItemCache>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("Serving items on http://{}{}", addr, ITEMS_PATH);

    axum::serve(listener, router(cache))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Cache endpoint failed")?;

    info!("Cache endpoint stopped");
    Ok(())
}
