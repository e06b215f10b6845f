use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::web::AppState;

/// 健康检查端点
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "metered-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": state.gateway.registry().ids(),
    }))
}
