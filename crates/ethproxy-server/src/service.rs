//! Router assembly and service lifecycle.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use ethproxy_common::api::{
    ETH_V0_BALANCE_PREFIX, ETH_V0_SEND_TX_PREFIX, ETH_V0_TX_PREFIX, ETH_V0_TX_RECEIPT_PREFIX,
    HEALTH_ENDPOINT, METRICS_ENDPOINT, STATUS_ENDPOINT,
};
use ethproxy_common::BuildInfo;
use ethproxy_pool::NodePool;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::{handlers, metrics, middleware};

/// Grace period for in-flight requests during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared application state handed to every handler.
pub struct AppState {
    pub pool: Arc<NodePool>,
    pub build_info: BuildInfo,
    pub metrics: PrometheusHandle,
}

/// Builds the full application router. `/metrics` is registered after the
/// observability layer so it stays unwrapped.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(STATUS_ENDPOINT, get(handlers::status))
        .route(HEALTH_ENDPOINT, get(handlers::health))
        .route(
            &format!("{ETH_V0_BALANCE_PREFIX}:address"),
            get(handlers::balance),
        )
        .route(
            &format!("{ETH_V0_TX_PREFIX}:hash"),
            get(handlers::transaction_by_hash),
        )
        .route(
            &format!("{ETH_V0_TX_RECEIPT_PREFIX}:hash"),
            get(handlers::transaction_receipt),
        )
        .route(
            &format!("{ETH_V0_SEND_TX_PREFIX}:data"),
            post(handlers::send_transaction),
        )
        .layer(axum::middleware::from_fn(middleware::observe))
        .route(METRICS_ENDPOINT, get(metrics::exposition))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The composed service: node pool plus HTTP boundary bound to a port.
pub struct Service {
    port: u16,
    build_info: BuildInfo,
    app: Router,
    shutdown: Option<oneshot::Sender<()>>,
    serve_task: Option<JoinHandle<()>>,
}

impl Service {
    pub fn new(
        port: u16,
        pool: Arc<NodePool>,
        build_info: BuildInfo,
        metrics: PrometheusHandle,
    ) -> Self {
        let state = Arc::new(AppState {
            pool,
            build_info,
            metrics,
        });
        Self {
            port,
            build_info,
            app: router(state),
            shutdown: None,
            serve_task: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Binds the port and serves in the background. Non-blocking: bind and
    /// serve errors surface via logging, matching the fire-and-forget
    /// startup contract.
    pub fn start(&mut self) {
        info!(
            service = self.build_info.service,
            version = self.build_info.version,
            "starting service"
        );
        let app = self.app.clone();
        let port = self.port;
        let (tx, rx) = oneshot::channel::<()>();
        self.shutdown = Some(tx);
        self.serve_task = Some(tokio::spawn(async move {
            let listener = match TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => listener,
                Err(err) => {
                    error!(port, error = %err, "failed to bind listener");
                    return;
                }
            };
            info!(port, "listening");
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %err, "server terminated");
            }
        }));
    }

    /// Stops accepting connections, waits up to [`SHUTDOWN_GRACE`] for
    /// in-flight requests, then force-closes.
    pub async fn stop(&mut self) {
        info!(service = self.build_info.service, "stopping service");
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.serve_task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("graceful shutdown timed out, aborting");
                task.abort();
            }
        }
    }
}
