use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tracing::{info, warn};

use crate::gateway::Gateway;
use crate::web::{
    handlers::{
        admin_handler::{deactivate_key, get_usage, issue_key},
        gateway_handler::invoke_endpoint,
        health_handler::health_check,
    },
    middleware::{admin_auth::require_admin, cors::cors_layer},
};

/// 空闲限流窗口的清理周期
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

pub struct AppState {
    pub gateway: Gateway,
    pub admin_token: Option<String>,
}

pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(gateway: Gateway, admin_token: Option<String>) -> Self {
        Self {
            state: Arc::new(AppState { gateway, admin_token }),
        }
    }

    pub async fn start(&self, addr: SocketAddr) -> Result<()> {
        if self.state.admin_token.is_none() {
            warn!("ADMIN_TOKEN is not set, admin routes are open to anyone who can reach the server");
        }

        let purge_state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                purge_state.gateway.admission().purge_idle();
            }
        });

        let app = router(Arc::clone(&self.state));

        info!(
            %addr,
            endpoints = ?self.state.gateway.registry().ids(),
            rate_limit_per_minute = self.state.gateway.admission().limit(),
            "Metered gateway listening"
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    // 管理路由
    let admin_routes = Router::new()
        .route("/api-keys", post(issue_key))
        .route("/api-keys/deactivate", post(deactivate_key))
        .route("/usage/:caller_id", get(get_usage))
        .route_layer(from_fn_with_state(Arc::clone(&state), require_admin));

    // 计费调用路由
    let api_routes = Router::new().route("/:endpoint_id", post(invoke_endpoint));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .nest("/admin", admin_routes)
        .layer(ServiceBuilder::new().layer(cors_layer()))
        .with_state(state)
}
