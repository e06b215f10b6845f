mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use metered_gateway::dao::usage_record::{count_usage_records, list_usage_records_by_caller};
use metered_gateway::gateway::key_store::generate_secret;
use metered_gateway::gateway::{
    Delegate, DelegateError, EndpointRegistry, FnDelegate, Gateway, GatewayError, GatewayOptions,
    InboundRequest,
};
use serde_json::{json, Value};

use common::{harness, setup_pool};

#[tokio::test]
async fn test_alice_usage_scenario() {
    let h = harness(30, 10).await;
    let secret = h.gateway.issue_key("alice").await.expect("issue failed");
    let request = InboundRequest::with_bearer(&secret);

    for _ in 0..3 {
        let out = h
            .gateway
            .call(&request, "test.echo", json!({"text": "hello"}))
            .await
            .expect("call failed");
        assert_eq!(out["caller"], "alice");
    }

    let err = h
        .gateway
        .call(&request, "test.echo", json!({"fail": true}))
        .await
        .unwrap_err();
    match err {
        GatewayError::DelegateFailure(detail) => assert!(detail.contains("forced delegate failure")),
        other => panic!("expected delegate failure, got {:?}", other),
    }

    let usage = h.gateway.get_usage("alice", 1).await.expect("get_usage failed");
    println!("✅ Usage: {:?}", usage);
    assert_eq!(usage.total_requests, 4);
    assert_eq!(usage.successful_requests, 3);
    assert_eq!(usage.failed_requests, 1);
    assert_eq!(usage.total_cost_cents, 30);

    let echo = &usage.endpoint_breakdown["test.echo"];
    assert_eq!((echo.count, echo.cost_cents, echo.success, echo.failed), (4, 30, 3, 1));

    let records = list_usage_records_by_caller(&h.pool, "alice").await.unwrap();
    let failed = records.iter().find(|r| !r.success).expect("failure not recorded");
    assert_eq!(failed.cost_cents, 0);
    assert!(failed.error_message.as_deref().unwrap_or("").contains("forced delegate failure"));
}

#[tokio::test]
async fn test_rate_limit_scenario() {
    let h = harness(5, 10).await;
    let secret = h.gateway.issue_key("bob").await.expect("issue failed");
    let request = InboundRequest::with_bearer(&secret);

    let mut outcomes = Vec::new();
    for _ in 0..6 {
        outcomes.push(h.gateway.call(&request, "test.echo", Value::Null).await);
        h.clock.advance(Duration::from_millis(100));
    }

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 5);
    assert!(matches!(
        outcomes.last(),
        Some(Err(GatewayError::RateLimitExceeded { .. }))
    ));
    assert_eq!(h.delegate_calls(), 5);
    assert_eq!(count_usage_records(&h.pool).await.unwrap(), 5);
}

#[tokio::test]
async fn test_unknown_credential_is_rejected_without_side_effects() {
    let h = harness(30, 10).await;
    let request = InboundRequest::with_bearer(&generate_secret());

    let err = h.gateway.call(&request, "test.echo", Value::Null).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidOrInactiveKey));
    assert_eq!(h.delegate_calls(), 0);
    assert_eq!(count_usage_records(&h.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_credential_is_unauthenticated() {
    let h = harness(30, 10).await;
    let request = InboundRequest::default().remote("198.51.100.4".parse().unwrap());

    let err = h.gateway.call(&request, "test.echo", Value::Null).await.unwrap_err();
    assert!(matches!(err, GatewayError::Unauthenticated));
    assert_eq!(h.delegate_calls(), 0);
    assert_eq!(count_usage_records(&h.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_anonymous_flood_is_throttled_by_address() {
    let h = harness(3, 10).await;
    let request = InboundRequest::default().remote("198.51.100.4".parse().unwrap());

    for _ in 0..3 {
        assert!(matches!(
            h.gateway.call(&request, "test.echo", Value::Null).await,
            Err(GatewayError::Unauthenticated)
        ));
    }
    // 准入在鉴权之前：第四次直接被限流，不再查询 Key Store
    assert!(matches!(
        h.gateway.call(&request, "test.echo", Value::Null).await,
        Err(GatewayError::RateLimitExceeded { .. })
    ));
}

#[tokio::test]
async fn test_deactivated_key_stops_working() {
    let h = harness(30, 10).await;
    let secret = h.gateway.issue_key("carol").await.unwrap();
    let request = InboundRequest::with_bearer(&secret);

    h.gateway.call(&request, "test.echo", Value::Null).await.expect("call failed");
    h.gateway.deactivate_key(&secret).await.expect("deactivate failed");
    h.gateway.deactivate_key(&secret).await.expect("second deactivate failed");

    let err = h.gateway.call(&request, "test.echo", Value::Null).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidOrInactiveKey));
    assert_eq!(h.delegate_calls(), 1);

    // 历史账目保留
    assert_eq!(h.gateway.get_usage("carol", 1).await.unwrap().total_requests, 1);
}

#[tokio::test]
async fn test_unknown_endpoint_is_not_metered() {
    let h = harness(1, 10).await;
    let secret = h.gateway.issue_key("dave").await.unwrap();
    let request = InboundRequest::with_bearer(&secret);

    let err = h.gateway.call(&request, "nope", Value::Null).await.unwrap_err();
    assert!(matches!(err, GatewayError::UnknownEndpoint(ref id) if id == "nope"));

    // 未知端点不占用准入名额
    h.gateway.call(&request, "test.echo", Value::Null).await.expect("call failed");
    assert_eq!(count_usage_records(&h.pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_empty_caller_id_is_rejected() {
    let h = harness(30, 10).await;
    assert!(matches!(h.gateway.issue_key("   ").await, Err(GatewayError::InvalidCallerId)));
}

#[tokio::test]
async fn test_cancelled_call_records_free_failure() {
    let pool = setup_pool().await;
    let started = Arc::new(AtomicUsize::new(0));
    let started_in_delegate = Arc::clone(&started);

    let slow: Arc<dyn Delegate> = Arc::new(FnDelegate::new(move |_endpoint, _caller, _payload| {
        let started = Arc::clone(&started_in_delegate);
        async move {
            started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok::<_, DelegateError>(Value::Null)
        }
    }));

    let mut registry = EndpointRegistry::new();
    registry.register("slow.op", 25, slow).unwrap();
    let gateway = Gateway::new(pool.clone(), registry, GatewayOptions::default());
    let secret = gateway.issue_key("erin").await.unwrap();
    let request = InboundRequest::with_bearer(&secret);

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        gateway.call(&request, "slow.op", Value::Null),
    )
    .await;
    assert!(outcome.is_err(), "call should have been cancelled");
    assert_eq!(started.load(Ordering::SeqCst), 1);

    // 取消后的记账在后台任务中完成
    let mut records = Vec::new();
    for _ in 0..50 {
        records = list_usage_records_by_caller(&pool, "erin").await.unwrap();
        if !records.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].cost_cents, 0);
    assert_eq!(records[0].endpoint, "slow.op");
}

#[tokio::test]
async fn test_every_failure_is_free() {
    let h = harness(100, 7).await;
    let secret = h.gateway.issue_key("frank").await.unwrap();
    let request = InboundRequest::with_bearer(&secret);

    for i in 0..20 {
        let _ = h
            .gateway
            .call(&request, "test.echo", json!({ "fail": i % 4 == 0 }))
            .await;
    }

    let records = list_usage_records_by_caller(&h.pool, "frank").await.unwrap();
    assert_eq!(records.len(), 20);
    assert!(records.iter().all(|r| r.success || r.cost_cents == 0));
    assert!(records.iter().filter(|r| r.success).all(|r| r.cost_cents == 7));
}

#[tokio::test]
async fn test_huge_usage_window_reports_all_history() {
    let h = harness(30, 10).await;
    let secret = h.gateway.issue_key("grace").await.unwrap();
    let request = InboundRequest::with_bearer(&secret);

    h.gateway.call(&request, "test.echo", Value::Null).await.expect("call failed");
    h.gateway
        .call(&request, "test.echo", json!({"fail": true}))
        .await
        .unwrap_err();

    for days in [100_000_000, u32::MAX] {
        let usage = h.gateway.get_usage("grace", days).await.expect("get_usage failed");
        println!("✅ {} day window: {} requests", days, usage.total_requests);
        assert_eq!(usage.period_days, days);
        assert_eq!(usage.total_requests, 2);
        assert_eq!(usage.total_cost_cents, 10);
    }
}
