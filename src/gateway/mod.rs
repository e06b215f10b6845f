//! # Gateway core
//!
//! 准入控制 → 鉴权 → 调用外部集成 → 记账。每个集成端点都经由
//! [`Gateway::call`] 进入，不允许绕过准入、鉴权或直接写账本。

pub mod admission;
pub mod auth;
pub mod delegate;
pub mod error;
pub mod key_store;
pub mod ledger;
mod metered;

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::info;

pub use admission::{AdmissionController, Clock, Identifier, ManualClock, SystemClock};
pub use auth::{Authenticator, InboundRequest};
pub use delegate::{Delegate, DelegateError, EndpointRegistry, FnDelegate, HttpDelegate};
pub use error::{GatewayError, GatewayResult};
pub use key_store::KeyStore;
pub use ledger::{Charge, EndpointUsage, UsageLedger, UsageSummary};

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Admission ceiling per identifier per rolling minute.
    pub rate_limit_per_minute: usize,
    /// How long a validated key is trusted before the store is asked again.
    pub key_cache_ttl: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 30,
            key_cache_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Clone)]
pub struct Gateway {
    admission: Arc<AdmissionController>,
    authenticator: Authenticator,
    keys: KeyStore,
    ledger: UsageLedger,
    registry: Arc<EndpointRegistry>,
}

impl Gateway {
    pub fn new(pool: SqlitePool, registry: EndpointRegistry, options: GatewayOptions) -> Self {
        Self::with_clock(pool, registry, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        pool: SqlitePool,
        registry: EndpointRegistry,
        options: GatewayOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let keys = KeyStore::new(pool.clone(), options.key_cache_ttl);
        Self {
            admission: Arc::new(AdmissionController::with_clock(options.rate_limit_per_minute, clock)),
            authenticator: Authenticator::new(keys.clone()),
            keys,
            ledger: UsageLedger::new(pool),
            registry: Arc::new(registry),
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Administrative: create the key of `caller_id` and return its secret.
    pub async fn issue_key(&self, caller_id: &str) -> GatewayResult<String> {
        let caller_id = caller_id.trim();
        if caller_id.is_empty() {
            return Err(GatewayError::InvalidCallerId);
        }
        self.keys.issue(caller_id).await
    }

    /// Administrative: revoke a key. Revoking twice, or revoking an unknown key, is a no-op.
    pub async fn deactivate_key(&self, secret: &str) -> GatewayResult<()> {
        self.keys.deactivate(secret).await?;
        Ok(())
    }

    /// Administrative: usage of `caller_id` over the last `window_days` days.
    pub async fn get_usage(&self, caller_id: &str, window_days: u32) -> GatewayResult<UsageSummary> {
        let summary = self.ledger.summarize(caller_id, window_days).await?;
        info!(
            caller_id,
            window_days,
            total_requests = summary.total_requests,
            total_cost_cents = summary.total_cost_cents,
            "Usage report generated"
        );
        Ok(summary)
    }
}
