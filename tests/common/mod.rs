#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metered_gateway::dao::{connect_sqlite_pool, init_schema};
use metered_gateway::gateway::{
    Delegate, DelegateError, EndpointRegistry, FnDelegate, Gateway, GatewayOptions, ManualClock,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;

/// 初始化测试环境的辅助函数：每个测试一个独立的内存数据库
pub async fn setup_pool() -> SqlitePool {
    let pool = connect_sqlite_pool("sqlite::memory:")
        .await
        .expect("connect failed");
    init_schema(&pool).await.expect("schema init failed");
    pool
}

/// Delegate that counts its invocations and fails when the payload asks it to.
pub fn counting_delegate(calls: Arc<AtomicUsize>) -> Arc<dyn Delegate> {
    Arc::new(FnDelegate::new(move |endpoint, caller, payload: Value| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if payload.get("fail").and_then(Value::as_bool).unwrap_or(false) {
                return Err(DelegateError::Failed("forced delegate failure".to_string()));
            }
            Ok(json!({ "endpoint": endpoint, "caller": caller }))
        }
    }))
}

pub struct Harness {
    pub gateway: Gateway,
    pub pool: SqlitePool,
    pub clock: Arc<ManualClock>,
    pub calls: Arc<AtomicUsize>,
}

impl Harness {
    pub fn delegate_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Gateway with a single `test.echo` endpoint priced at `cost_cents`.
pub async fn harness(rate_limit_per_minute: usize, cost_cents: u32) -> Harness {
    let pool = setup_pool().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let clock = Arc::new(ManualClock::new());

    let mut registry = EndpointRegistry::new();
    registry
        .register("test.echo", cost_cents, counting_delegate(Arc::clone(&calls)))
        .expect("register failed");

    let options = GatewayOptions {
        rate_limit_per_minute,
        ..GatewayOptions::default()
    };
    let gateway = Gateway::with_clock(pool.clone(), registry, options, clock.clone());

    Harness { gateway, pool, clock, calls }
}
