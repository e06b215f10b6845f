//! # Metered gateway 启动程序

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use metered_gateway::{
    config::{load_endpoint_specs, EndpointSpec, GatewayConfig},
    dao::{connect_sqlite_pool, init_db, init_schema},
    gateway::{EndpointRegistry, Gateway, HttpDelegate},
    logger,
    web::WebServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = GatewayConfig::from_env()?;

    //*
    //* Initialize logger
    //*
    let _log_guard = logger::init_logger(config.log.clone())?;
    info!(?config, "Configuration loaded");

    //*
    //* Initialize database
    //*
    let pool = connect_sqlite_pool(&config.database_url)
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;
    init_schema(&pool).await.context("failed to apply schema")?;
    if let Some(path) = &config.init_sql_path {
        init_db(&pool, path)
            .await
            .with_context(|| format!("failed to run {}", path))?;
    }
    info!("Database initialized successfully");

    //*
    //* Register integrations
    //*
    let specs = match &config.endpoints_file {
        Some(path) => load_endpoint_specs(path)?,
        None => Vec::new(),
    };
    let registry = build_registry(&specs)?;
    info!(endpoints = registry.len(), "Endpoint registry built");

    let gateway = Gateway::new(pool, registry, config.gateway_options());
    WebServer::new(gateway, config.admin_token.clone())
        .start(config.bind_addr)
        .await
}

fn build_registry(specs: &[EndpointSpec]) -> Result<EndpointRegistry> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("metered-gateway/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let mut registry = EndpointRegistry::new();
    for spec in specs {
        let delegate = HttpDelegate::new(client.clone(), spec.upstream_url.clone(), spec.timeout());
        registry.register(&spec.id, spec.cost_cents, Arc::new(delegate))?;
    }
    Ok(registry)
}
