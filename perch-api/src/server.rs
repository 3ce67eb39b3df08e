use crate::handlers;
use axum::Router;
use axum::routing::{any, get};
use perch_dispatch::Dispatcher;
use perch_observability::metrics::MetricsCollector;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<MetricsCollector>,
    pub max_body_bytes: usize,
}

impl ApiState {
    pub fn new(dispatcher: Arc<Dispatcher>, metrics: Arc<MetricsCollector>, max_body_bytes: usize) -> Self {
        Self {
            dispatcher,
            metrics,
            max_body_bytes,
        }
    }
}

/// Build the axum router.
///
/// The metrics route only exists when the collector is enabled.
pub fn build_router(state: ApiState, metrics_path: &str) -> Router {
    let mut app = Router::new()
        // Plugin dispatch
        .route("/api/v1/plugins/{plugin_id}", any(handlers::dispatch::dispatch))
        .route("/api/v1/plugins/{plugin_id}/", any(handlers::dispatch::dispatch))
        .route("/api/v1/plugins/{plugin_id}/{*path}", any(handlers::dispatch::dispatch))
        // Health
        .route("/health", get(handlers::health::health_check));

    if state.metrics.is_enabled() {
        app = app.route(metrics_path, get(handlers::metrics::render));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: &str, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Perch API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    info!("Perch API stopped");
    Ok(())
}
