use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueKeyRequest {
    pub caller_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueKeyResponse {
    pub success: bool,
    pub caller_id: String,
    pub api_key: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeactivateKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub days: Option<u32>,
}
