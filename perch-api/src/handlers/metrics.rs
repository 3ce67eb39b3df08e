use crate::server::ApiState;
use axum::extract::State;
use http::header::CONTENT_TYPE;

/// Prometheus text exposition.
pub async fn render(State(state): State<ApiState>) -> ([(http::HeaderName, &'static str); 1], String) {
    state
        .metrics
        .set_limiter_buckets(state.dispatcher.limiter().bucket_count());
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}
