//! # Delegates
//!
//! 外部集成（发邮件、发帖……）的统一调用契约。每个集成以固定的
//! endpoint id 和固定价格注册；网关只关心“执行并报告结果”。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::gateway::error::{GatewayError, GatewayResult};

/// Upstream bodies quoted in errors are cut to this many characters.
const MAX_UPSTREAM_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Failed(String),
}

/// An external integration invoked after admission and authentication.
///
/// Retries, if any, are the delegate's own business.
#[async_trait]
pub trait Delegate: Send + Sync {
    async fn execute(
        &self,
        endpoint_id: &str,
        caller_id: &str,
        payload: Value,
    ) -> Result<Value, DelegateError>;
}

/// Adapts an async closure into a [`Delegate`].
pub struct FnDelegate<F> {
    f: F,
}

impl<F, Fut> FnDelegate<F>
where
    F: Fn(String, String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, DelegateError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Delegate for FnDelegate<F>
where
    F: Fn(String, String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, DelegateError>> + Send + 'static,
{
    async fn execute(
        &self,
        endpoint_id: &str,
        caller_id: &str,
        payload: Value,
    ) -> Result<Value, DelegateError> {
        (self.f)(endpoint_id.to_string(), caller_id.to_string(), payload).await
    }
}

/// Forwards the payload as JSON to an upstream HTTP service.
pub struct HttpDelegate {
    client: reqwest::Client,
    upstream_url: String,
    timeout: Duration,
}

impl HttpDelegate {
    pub fn new(client: reqwest::Client, upstream_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            upstream_url: upstream_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Delegate for HttpDelegate {
    async fn execute(
        &self,
        endpoint_id: &str,
        caller_id: &str,
        payload: Value,
    ) -> Result<Value, DelegateError> {
        debug!(endpoint = endpoint_id, url = %self.upstream_url, "Forwarding to upstream");

        let response = self
            .client
            .post(&self.upstream_url)
            .timeout(self.timeout)
            .header("X-Gateway-Endpoint", endpoint_id)
            .header("X-Gateway-Caller", caller_id)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(DelegateError::Upstream {
                status: status.as_u16(),
                body: text.chars().take(MAX_UPSTREAM_BODY_CHARS).collect(),
            });
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| DelegateError::InvalidResponse(e.to_string()))
    }
}

/// A priced integration endpoint.
#[derive(Clone)]
pub struct Endpoint {
    pub id: String,
    pub cost_cents: u32,
    pub delegate: Arc<dyn Delegate>,
}

/// Fixed table of endpoints, built once at start-up.
#[derive(Clone, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, Endpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: &str,
        cost_cents: u32,
        delegate: Arc<dyn Delegate>,
    ) -> GatewayResult<()> {
        if self.endpoints.contains_key(id) {
            return Err(GatewayError::DuplicateEndpoint(id.to_string()));
        }
        self.endpoints.insert(
            id.to_string(),
            Endpoint {
                id: id.to_string(),
                cost_cents,
                delegate,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Registered endpoint ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.endpoints.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Arc<dyn Delegate> {
        Arc::new(FnDelegate::new(|_endpoint, _caller, payload| async move { Ok::<_, DelegateError>(payload) }))
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = EndpointRegistry::new();
        registry.register("email.send", 15, echo()).unwrap();

        let err = registry.register("email.send", 20, echo()).unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateEndpoint(id) if id == "email.send"));
        assert_eq!(registry.get("email.send").map(|e| e.cost_cents), Some(15));
    }

    #[test]
    fn ids_are_sorted() {
        let mut registry = EndpointRegistry::new();
        registry.register("twitter.tweet", 10, echo()).unwrap();
        registry.register("email.send", 15, echo()).unwrap();
        assert_eq!(registry.ids(), vec!["email.send", "twitter.tweet"]);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn fn_delegate_passes_arguments_through() {
        let delegate = FnDelegate::new(|endpoint, caller, payload| async move {
            Ok::<_, DelegateError>(json!({ "endpoint": endpoint, "caller": caller, "payload": payload }))
        });

        let out = delegate.execute("email.send", "alice", json!({"to": "x"})).await.unwrap();
        assert_eq!(out["endpoint"], "email.send");
        assert_eq!(out["caller"], "alice");
        assert_eq!(out["payload"]["to"], "x");
    }
}
