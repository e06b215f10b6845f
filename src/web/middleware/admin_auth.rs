use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::gateway::InboundRequest;
use crate::web::AppState;

/// 管理接口鉴权：配置了 ADMIN_TOKEN 时要求 `Authorization: Bearer <token>`
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return next.run(request).await;
    };

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let presented = InboundRequest::new(authorization, None);

    let authorized = presented
        .bearer()
        .map(|token| bool::from(token.as_bytes().ct_eq(expected.as_bytes())))
        .unwrap_or(false);

    if authorized {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "Admin request rejected");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Admin token required" })),
        )
            .into_response()
    }
}
