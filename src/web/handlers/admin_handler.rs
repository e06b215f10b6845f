use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde_json::{json, Value};

use crate::gateway::{GatewayError, UsageSummary};
use crate::web::AppState;
use crate::web::dto::admin_dto::{DeactivateKeyRequest, IssueKeyRequest, IssueKeyResponse, UsageQuery};

const DEFAULT_USAGE_DAYS: u32 = 30;

/// 为调用方签发 API Key
pub async fn issue_key(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IssueKeyRequest>,
) -> Result<Json<IssueKeyResponse>, GatewayError> {
    let api_key = state.gateway.issue_key(&request.caller_id).await?;
    Ok(Json(IssueKeyResponse {
        success: true,
        caller_id: request.caller_id.trim().to_string(),
        api_key,
        message: "API key created successfully. Keep it secure!".to_string(),
    }))
}

/// 停用 API Key，重复停用不报错
pub async fn deactivate_key(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeactivateKeyRequest>,
) -> Result<Json<Value>, GatewayError> {
    state.gateway.deactivate_key(&request.api_key).await?;
    Ok(Json(json!({
        "success": true,
        "message": "API key deactivated"
    })))
}

/// 查询调用方用量统计
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    Path(caller_id): Path<String>,
    Query(params): Query<UsageQuery>,
) -> Result<Json<UsageSummary>, GatewayError> {
    let days = params.days.unwrap_or(DEFAULT_USAGE_DAYS);
    let summary = state.gateway.get_usage(&caller_id, days).await?;
    Ok(Json(summary))
}
