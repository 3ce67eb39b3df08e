use crate::server::ApiState;
use axum::extract::State;
use axum::response::Json;
use serde_json::{Value, json};

pub async fn health_check(State(state): State<ApiState>) -> Json<Value> {
    let registries = state.dispatcher.registries();
    let limiter = state.dispatcher.limiter();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "plugins": {
            "unary": registries.unary.len(),
            "streaming": registries.streaming.len(),
            "ui": registries.ui.all().len(),
        },
        "limiter": {
            "shards": limiter.shard_count(),
            "buckets": limiter.bucket_count(),
        },
    }))
}
