use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dao::api_key::{
    ApiKey, create_api_key, deactivate_api_key, get_active_api_key_by_secret, get_api_key_by_caller,
};
use crate::dao::cache::CacheService;
use crate::gateway::error::{GatewayError, GatewayResult};

/// Namespace tag that makes gateway keys recognisable in logs.
pub const SECRET_PREFIX: &str = "sk_";

/// 256 bits of randomness per secret.
const SECRET_BYTES: usize = 32;

const ISSUE_ATTEMPTS: usize = 3;

const KEY_CACHE_CAPACITY: u64 = 10_000;

/// Persistent mapping from secret to caller, fronted by a short-lived cache of validated keys.
#[derive(Clone)]
pub struct KeyStore {
    pool: SqlitePool,
    validated: CacheService<String, String>,
    /// Bumped before every deactivation; a validation that overlaps one is not cached.
    revocations: Arc<AtomicU64>,
}

impl KeyStore {
    pub fn new(pool: SqlitePool, cache_ttl: Duration) -> Self {
        Self {
            pool,
            validated: CacheService::new(cache_ttl, KEY_CACHE_CAPACITY),
            revocations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Resolve a secret to its caller id.
    ///
    /// Unknown and deactivated secrets produce the same `InvalidOrInactiveKey`.
    pub async fn validate(&self, secret: &str) -> GatewayResult<String> {
        if let Some(caller_id) = self.validated.get(&secret.to_string()).await {
            return Ok(caller_id);
        }

        let generation = self.revocation_generation();
        match get_active_api_key_by_secret(&self.pool, secret).await? {
            Some(api_key) => {
                self.remember(secret, &api_key.caller_id, generation).await;
                Ok(api_key.caller_id)
            }
            None => {
                debug!(key = %fingerprint(secret), "Credential rejected");
                Err(GatewayError::InvalidOrInactiveKey)
            }
        }
    }

    /// Create the API key of `caller_id` and return its secret.
    ///
    /// Each caller owns at most one key for the lifetime of the store.
    pub async fn issue(&self, caller_id: &str) -> GatewayResult<String> {
        if get_api_key_by_caller(&self.pool, caller_id).await?.is_some() {
            return Err(GatewayError::CallerAlreadyRegistered(caller_id.to_string()));
        }

        for attempt in 1..=ISSUE_ATTEMPTS {
            let api_key = ApiKey {
                id: Uuid::new_v4().to_string(),
                caller_id: caller_id.to_string(),
                secret: generate_secret(),
                is_active: true,
                created_at: None,
            };

            match create_api_key(&self.pool, &api_key).await {
                Ok(_) => {
                    info!(caller_id, key = %fingerprint(&api_key.secret), "Issued API key");
                    return Ok(api_key.secret);
                }
                Err(e) if is_unique_violation(&e) => {
                    // 并发注册同一 caller，或随机密钥碰撞
                    if get_api_key_by_caller(&self.pool, caller_id).await?.is_some() {
                        return Err(GatewayError::CallerAlreadyRegistered(caller_id.to_string()));
                    }
                    warn!(caller_id, attempt, "Generated secret collided, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(GatewayError::Store(sqlx::Error::Protocol(format!(
            "could not generate a unique API key after {} attempts",
            ISSUE_ATTEMPTS
        ))))
    }

    // 先写缓存再复查代数：与之并发的停用要么在这里被发现，
    // 要么它的 invalidate 发生在写入之后
    async fn remember(&self, secret: &str, caller_id: &str, generation: u64) {
        self.validated
            .insert(secret.to_string(), caller_id.to_string())
            .await;
        if self.revocation_generation() != generation {
            self.validated.invalidate(&secret.to_string()).await;
        }
    }

    fn revocation_generation(&self) -> u64 {
        self.revocations.load(Ordering::SeqCst)
    }

    /// Mark a key inactive. Returns whether the stored state changed.
    pub async fn deactivate(&self, secret: &str) -> GatewayResult<bool> {
        self.revocations.fetch_add(1, Ordering::SeqCst);
        let rows = deactivate_api_key(&self.pool, secret).await?;
        self.validated.invalidate(&secret.to_string()).await;
        if rows > 0 {
            info!(key = %fingerprint(secret), "Deactivated API key");
        } else {
            debug!(key = %fingerprint(secret), "Deactivation was a no-op");
        }
        Ok(rows > 0)
    }

    pub async fn key_for_caller(&self, caller_id: &str) -> GatewayResult<Option<ApiKey>> {
        Ok(get_api_key_by_caller(&self.pool, caller_id).await?)
    }
}

/// `sk_` followed by 32 random bytes in URL-safe base64.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", SECRET_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

/// Short SHA-256 fingerprint of a credential, safe to log.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}
