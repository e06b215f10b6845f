use sqlx::{SqlitePool, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UsageRecord {
    pub id: String,
    pub caller_id: String,
    pub endpoint: String,
    /// Unix epoch milliseconds
    pub timestamp_ms: i64,
    pub cost_cents: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Append a usage record (async)
pub async fn create_usage_record(pool: &SqlitePool, record: &UsageRecord) -> Result<u64> {
    let res = sqlx::query(r#"
        INSERT INTO usage_records (
            id, caller_id, endpoint, timestamp_ms, cost_cents, success, error_message
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
    "#)
        .bind(&record.id)
        .bind(&record.caller_id)
        .bind(&record.endpoint)
        .bind(record.timestamp_ms)
        .bind(record.cost_cents)
        .bind(record.success)
        .bind(&record.error_message)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// List a caller's usage records at or after `since_ms`, oldest first (async)
pub async fn list_usage_records_since(pool: &SqlitePool, caller_id: &str, since_ms: i64) -> Result<Vec<UsageRecord>> {
    let records = sqlx::query_as::<_, UsageRecord>(r#"
        SELECT * FROM usage_records
        WHERE caller_id = ? AND timestamp_ms >= ?
        ORDER BY timestamp_ms ASC, rowid ASC
    "#)
        .bind(caller_id)
        .bind(since_ms)
        .fetch_all(pool)
        .await?;
    Ok(records)
}

/// List every usage record of a caller, oldest first (async)
pub async fn list_usage_records_by_caller(pool: &SqlitePool, caller_id: &str) -> Result<Vec<UsageRecord>> {
    list_usage_records_since(pool, caller_id, i64::MIN).await
}

/// Get count of usage records by caller (async)
pub async fn count_usage_records_by_caller(pool: &SqlitePool, caller_id: &str) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_records WHERE caller_id = ?")
        .bind(caller_id)
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}

/// Get count of usage records (async)
pub async fn count_usage_records(pool: &SqlitePool) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_records")
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}
