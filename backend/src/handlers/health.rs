use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::database;
use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let Some(pool) = &state.pool else {
        return (StatusCode::OK, Json(json!({"status": "healthy", "store": "memory"})));
    };

    if database::health_check(pool).await {
        (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "store": "postgres",
                "pool": database::pool_stats(pool),
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy", "store": "postgres"})),
        )
    }
}
