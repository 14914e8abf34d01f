//! Prometheus metrics plumbing.
//!
//! The recorder is installed once at startup; the handle travels with the
//! application state so the `/metrics` route can render the exposition text.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use ethproxy_common::{EthProxyError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::service::AppState;

/// Installs the process-global Prometheus recorder. Call once, from main.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| EthProxyError::Config(format!("metrics recorder: {e}")))
}

/// `GET /metrics` - Prometheus exposition text. Not wrapped by the logging
/// middleware so scrapes stay out of the request logs.
pub async fn exposition(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}
