//! # 配置
//!
//! 所有配置来自环境变量（启动时先加载 `.env`）。

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::gateway::GatewayOptions;
use crate::logger::{LogConfig, LogLevel, dev_log_config, prod_log_config};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/gateway.db";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_RATE_LIMIT_PER_MINUTE: usize = 30;
const DEFAULT_KEY_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("failed to read endpoints file {path}: {source}")]
    EndpointsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid endpoints file {path}: {source}")]
    EndpointsFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One priced integration forwarded to an upstream HTTP service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointSpec {
    pub id: String,
    pub cost_cents: u32,
    pub upstream_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_MS
}

impl EndpointSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub database_url: String,
    /// Extra SQL run after the built-in schema
    pub init_sql_path: Option<String>,
    pub bind_addr: SocketAddr,
    pub rate_limit_per_minute: usize,
    pub key_cache_ttl: Duration,
    /// Bearer token guarding the admin routes (None = open)
    pub admin_token: Option<String>,
    pub endpoints_file: Option<String>,
    pub log: LogConfig,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("database_url", &self.database_url)
            .field("init_sql_path", &self.init_sql_path)
            .field("bind_addr", &self.bind_addr)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("key_cache_ttl", &self.key_cache_ttl)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .field("endpoints_file", &self.endpoints_file)
            .field("log", &self.log)
            .finish()
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let init_sql_path = var("INIT_SQL_PATH");

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name: "BIND_ADDR", value: bind_addr.clone() })?;

        let rate_limit_per_minute =
            parse_or("RATE_LIMIT_PER_MINUTE", var("RATE_LIMIT_PER_MINUTE"), DEFAULT_RATE_LIMIT_PER_MINUTE)?;
        let key_cache_ttl_secs =
            parse_or("KEY_CACHE_TTL_SECS", var("KEY_CACHE_TTL_SECS"), DEFAULT_KEY_CACHE_TTL_SECS)?;

        // LOG_PROFILE 选定基线，其余 LOG_* 变量在其上覆盖
        let mut log = match var("LOG_PROFILE") {
            None => LogConfig::default(),
            Some(profile) => match profile.to_ascii_lowercase().as_str() {
                "dev" => dev_log_config(),
                "prod" => prod_log_config(),
                _ => return Err(ConfigError::InvalidValue { name: "LOG_PROFILE", value: profile }),
            },
        };
        if let Some(dir) = var("LOG_DIR") {
            log.log_dir = dir;
        }
        if let Some(level) = var("LOG_LEVEL") {
            log.level = level
                .parse::<LogLevel>()
                .map_err(|_| ConfigError::InvalidValue { name: "LOG_LEVEL", value: level.clone() })?;
        }
        log.json_format = parse_or("LOG_JSON", var("LOG_JSON"), log.json_format)?;
        log.console_output = parse_or("LOG_CONSOLE", var("LOG_CONSOLE"), log.console_output)?;

        Ok(Self {
            database_url,
            init_sql_path,
            bind_addr,
            rate_limit_per_minute,
            key_cache_ttl: Duration::from_secs(key_cache_ttl_secs),
            admin_token: var("ADMIN_TOKEN"),
            endpoints_file: var("ENDPOINTS_FILE"),
            log,
        })
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            rate_limit_per_minute: self.rate_limit_per_minute,
            key_cache_ttl: self.key_cache_ttl,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

/// Read the JSON array of endpoint definitions.
pub fn load_endpoint_specs(path: impl AsRef<Path>) -> Result<Vec<EndpointSpec>, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::EndpointsFile {
        path: path.display().to_string(),
        source,
    })?;
    parse_endpoint_specs(&raw).map_err(|source| ConfigError::EndpointsFormat {
        path: path.display().to_string(),
        source,
    })
}

pub fn parse_endpoint_specs(raw: &str) -> Result<Vec<EndpointSpec>, serde_json::Error> {
    serde_json::from_str(raw)
}
