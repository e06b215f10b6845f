mod common;

use std::sync::Arc;
use std::time::Duration;

use metered_gateway::dao::usage_record::list_usage_records_by_caller;
use metered_gateway::gateway::{
    Delegate, DelegateError, EndpointRegistry, Gateway, GatewayError, GatewayOptions, HttpDelegate,
    InboundRequest,
};
use mockito::Matcher;
use serde_json::json;

use common::setup_pool;

fn delegate_for(url: String) -> HttpDelegate {
    HttpDelegate::new(reqwest::Client::new(), url, Duration::from_secs(5))
}

#[tokio::test]
async fn test_forwards_payload_and_returns_json() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/send")
        .match_header("x-gateway-endpoint", "email.send")
        .match_header("x-gateway-caller", "alice")
        .match_body(Matcher::Json(json!({"to": "bob@example.com", "subject": "hi"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message_id":"abc123"}"#)
        .create_async()
        .await;

    let delegate = delegate_for(format!("{}/send", server.url()));
    let out = delegate
        .execute("email.send", "alice", json!({"to": "bob@example.com", "subject": "hi"}))
        .await
        .expect("execute failed");

    assert_eq!(out["message_id"], "abc123");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/noop")
        .with_status(204)
        .create_async()
        .await;

    let delegate = delegate_for(format!("{}/noop", server.url()));
    let out = delegate.execute("noop", "alice", json!({})).await.expect("execute failed");
    assert!(out.is_null());
}

#[tokio::test]
async fn test_upstream_error_status_is_a_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/post")
        .with_status(503)
        .with_body("service unavailable")
        .create_async()
        .await;

    let delegate = delegate_for(format!("{}/post", server.url()));
    let err = delegate.execute("reddit.post", "alice", json!({})).await.unwrap_err();
    match err {
        DelegateError::Upstream { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "service unavailable");
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_metered_http_failure_is_not_charged() {
    let mut server = mockito::Server::new_async().await;
    let _ok = server
        .mock("POST", "/tweet")
        .match_body(Matcher::PartialJson(json!({"text": "ok"})))
        .with_status(200)
        .with_body(r#"{"id":"1"}"#)
        .create_async()
        .await;
    let _bad = server
        .mock("POST", "/tweet")
        .match_body(Matcher::PartialJson(json!({"text": "bad"})))
        .with_status(500)
        .with_body("duplicate status")
        .create_async()
        .await;

    let pool = setup_pool().await;
    let mut registry = EndpointRegistry::new();
    registry
        .register("twitter.tweet", 10, Arc::new(delegate_for(format!("{}/tweet", server.url()))))
        .unwrap();
    let gateway = Gateway::new(pool.clone(), registry, GatewayOptions::default());

    let secret = gateway.issue_key("alice").await.unwrap();
    let request = InboundRequest::with_bearer(&secret);

    gateway
        .call(&request, "twitter.tweet", json!({"text": "ok"}))
        .await
        .expect("tweet failed");
    let err = gateway
        .call(&request, "twitter.tweet", json!({"text": "bad"}))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::DelegateFailure(ref d) if d.contains("500")));

    let records = list_usage_records_by_caller(&pool, "alice").await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!((records[0].success, records[0].cost_cents), (true, 10));
    assert_eq!((records[1].success, records[1].cost_cents), (false, 0));
    assert!(records[1].error_message.as_deref().unwrap().contains("duplicate status"));
}
