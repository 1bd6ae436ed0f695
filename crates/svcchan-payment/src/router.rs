//! Axum router for the payment-receiver binary: `/pay` and `/metrics` on one surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use svcchan_store::Store;

use crate::cheque;

/// Shared state reachable from every route.
pub struct AppState {
    pub store: Store,
}

async fn metrics_handler() -> ([(HeaderName, String); 1], Bytes) {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        tracing::error!(error = %e, "failed to encode prometheus metrics");
    }
    ([(CONTENT_TYPE, encoder.format_type().to_string())], buf.into())
}

/// Builds the router, registering this crate's metrics as a side effect of
/// the first call.
pub fn build(store: Store, request_timeout: Duration) -> Router {
    crate::metrics::install();
    let state = Arc::new(AppState { store });
    Router::new()
        .route("/pay", post(cheque::handle))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Serves `router` on `bind_address` until the process is killed; the
/// daemon binary wraps this with its own shutdown signal handling.
pub async fn serve(router: Router, bind_address: &str) -> std::io::Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .unwrap_or_else(|_| panic!("invalid payment_server.bind_address: {bind_address}"));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}
