use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use crate::gateway::GatewayError;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::RateLimitExceeded { retry_after } => {
                // 向上取整，避免客户端过早重试
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": "Rate limit exceeded",
                        "detail": "Too many requests. Please slow down."
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            GatewayError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Missing bearer credential" })),
            )
                .into_response(),
            GatewayError::InvalidOrInactiveKey => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid or inactive API key" })),
            )
                .into_response(),
            GatewayError::DelegateFailure(detail) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Operation failed", "detail": detail })),
            )
                .into_response(),
            GatewayError::UnknownEndpoint(id) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Unknown endpoint", "endpoint": id })),
            )
                .into_response(),
            GatewayError::CallerAlreadyRegistered(caller_id) => (
                StatusCode::CONFLICT,
                Json(json!({ "error": "Caller already has an API key", "caller_id": caller_id })),
            )
                .into_response(),
            GatewayError::InvalidCallerId => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "caller_id must not be empty" })),
            )
                .into_response(),
            other => {
                error!(error = %other, "Internal gateway error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal error" })),
                )
                    .into_response()
            }
        }
    }
}
