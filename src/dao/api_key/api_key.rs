use sqlx::{SqlitePool, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: String,
    pub caller_id: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub is_active: bool,
    pub created_at: Option<String>,
}

/// Create a new API key entry (async)
pub async fn create_api_key(pool: &SqlitePool, api_key: &ApiKey) -> Result<u64> {
    let res = sqlx::query(r#"
        INSERT INTO api_keys (
            id, caller_id, secret, is_active, created_at
        ) VALUES (?, ?, ?, ?, datetime('now'))
    "#)
        .bind(&api_key.id)
        .bind(&api_key.caller_id)
        .bind(&api_key.secret)
        .bind(api_key.is_active)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Read an API key entry by secret, regardless of status (async)
pub async fn get_api_key_by_secret(pool: &SqlitePool, secret: &str) -> Result<Option<ApiKey>> {
    let api_key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE secret = ?")
        .bind(secret)
        .fetch_optional(pool)
        .await?;
    Ok(api_key)
}

/// Read an active API key entry by secret (async)
pub async fn get_active_api_key_by_secret(pool: &SqlitePool, secret: &str) -> Result<Option<ApiKey>> {
    let api_key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE secret = ? AND is_active = 1")
        .bind(secret)
        .fetch_optional(pool)
        .await?;
    Ok(api_key)
}

/// Read the API key owned by a caller (async)
pub async fn get_api_key_by_caller(pool: &SqlitePool, caller_id: &str) -> Result<Option<ApiKey>> {
    let api_key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE caller_id = ?")
        .bind(caller_id)
        .fetch_optional(pool)
        .await?;
    Ok(api_key)
}

/// Deactivate an API key by secret; already inactive keys are left untouched (async)
pub async fn deactivate_api_key(pool: &SqlitePool, secret: &str) -> Result<u64> {
    let res = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE secret = ? AND is_active = 1")
        .bind(secret)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Get count of API keys (async)
pub async fn count_api_keys(pool: &SqlitePool) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys")
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}
