use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};

use crate::gateway::InboundRequest;
use crate::web::AppState;

/// 计费调用入口：POST /api/:endpoint_id
pub async fn invoke_endpoint(
    State(state): State<Arc<AppState>>,
    Path(endpoint_id): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(payload) => payload,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Request body must be JSON", "detail": e.to_string() })),
                )
                    .into_response();
            }
        }
    };

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let request = InboundRequest::new(authorization, connect_info.map(|ConnectInfo(addr)| addr.ip()));

    match state.gateway.call(&request, &endpoint_id, payload).await {
        Ok(result) => Json(json!({
            "success": true,
            "endpoint": endpoint_id,
            "result": result,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}
