//! # Usage ledger
//!
//! 追加写入的计费记录。失败的调用同样落账，但费用恒为 0。

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, error};
use uuid::Uuid;

use crate::dao::usage_record::{UsageRecord, create_usage_record, list_usage_records_since};
use crate::gateway::error::{GatewayError, GatewayResult};

/// Stored diagnostics are cut to this many characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// One completed gateway operation, ready to be written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub caller_id: String,
    pub endpoint: String,
    pub cost_cents: u32,
    pub success: bool,
    pub error_message: Option<String>,
}

impl Charge {
    pub fn success(caller_id: &str, endpoint: &str, cost_cents: u32) -> Self {
        Self {
            caller_id: caller_id.to_string(),
            endpoint: endpoint.to_string(),
            cost_cents,
            success: true,
            error_message: None,
        }
    }

    /// Failed operations are never charged.
    pub fn failure(caller_id: &str, endpoint: &str, error_message: &str) -> Self {
        Self {
            caller_id: caller_id.to_string(),
            endpoint: endpoint.to_string(),
            cost_cents: 0,
            success: false,
            error_message: Some(error_message.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct UsageLedger {
    pool: SqlitePool,
}

impl UsageLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fire-and-forget append. A failed write is logged and swallowed.
    pub async fn record(&self, charge: Charge) {
        let caller_id = charge.caller_id.clone();
        let endpoint = charge.endpoint.clone();
        if let Err(e) = self.try_record(charge).await {
            error!(
                caller_id = %caller_id,
                endpoint = %endpoint,
                error = %e,
                "Failed to write usage record"
            );
        }
    }

    /// Append a usage record, reporting `LedgerWriteFailure` if it could not be persisted.
    pub async fn try_record(&self, charge: Charge) -> GatewayResult<UsageRecord> {
        let record = UsageRecord {
            id: Uuid::new_v4().to_string(),
            caller_id: charge.caller_id,
            endpoint: charge.endpoint,
            timestamp_ms: Utc::now().timestamp_millis(),
            cost_cents: if charge.success { i64::from(charge.cost_cents) } else { 0 },
            success: charge.success,
            error_message: charge.error_message.map(truncate_diagnostic),
        };

        create_usage_record(&self.pool, &record)
            .await
            .map_err(|e| GatewayError::LedgerWriteFailure(e.to_string()))?;

        debug!(
            caller_id = %record.caller_id,
            endpoint = %record.endpoint,
            cost_cents = record.cost_cents,
            success = record.success,
            "Recorded usage"
        );
        Ok(record)
    }

    /// Records of `caller_id` with timestamp at or after `since`, oldest first.
    pub async fn query(&self, caller_id: &str, since: DateTime<Utc>) -> GatewayResult<Vec<UsageRecord>> {
        Ok(list_usage_records_since(&self.pool, caller_id, since.timestamp_millis()).await?)
    }

    /// Aggregate usage of `caller_id` over the last `window_days` days.
    pub async fn summarize(&self, caller_id: &str, window_days: u32) -> GatewayResult<UsageSummary> {
        let records = self.query(caller_id, window_start(Utc::now(), window_days)).await?;
        Ok(UsageSummary::from_records(caller_id, window_days, &records))
    }
}

// 窗口超出可表示的时间范围时退化为全部历史
fn window_start(now: DateTime<Utc>, window_days: u32) -> DateTime<Utc> {
    ChronoDuration::try_days(i64::from(window_days))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn truncate_diagnostic(message: String) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        message
    } else {
        message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointUsage {
    pub count: u64,
    pub cost_cents: u64,
    pub success: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub caller_id: String,
    pub period_days: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_cost_cents: u64,
    pub total_cost_dollars: f64,
    pub endpoint_breakdown: BTreeMap<String, EndpointUsage>,
}

impl UsageSummary {
    pub fn from_records(caller_id: &str, period_days: u32, records: &[UsageRecord]) -> Self {
        let mut endpoint_breakdown: BTreeMap<String, EndpointUsage> = BTreeMap::new();
        let mut successful_requests = 0;
        let mut total_cost_cents = 0;

        for record in records {
            let cost = record.cost_cents.max(0) as u64;
            let entry = endpoint_breakdown.entry(record.endpoint.clone()).or_default();
            entry.count += 1;
            entry.cost_cents += cost;
            if record.success {
                entry.success += 1;
                successful_requests += 1;
            } else {
                entry.failed += 1;
            }
            total_cost_cents += cost;
        }

        let total_requests = records.len() as u64;
        Self {
            caller_id: caller_id.to_string(),
            period_days,
            total_requests,
            successful_requests,
            failed_requests: total_requests - successful_requests,
            total_cost_cents,
            total_cost_dollars: total_cost_cents as f64 / 100.0,
            endpoint_breakdown,
        }
    }
}
