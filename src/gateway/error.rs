use std::time::Duration;
use thiserror::Error;

/// Per-request failures of the gateway core. None of them is fatal to the process.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Admission ceiling reached; the caller may retry after `retry_after`.
    #[error("rate limit exceeded, retry after {}s", .retry_after.as_secs())]
    RateLimitExceeded { retry_after: Duration },

    /// No bearer credential was presented.
    #[error("missing bearer credential")]
    Unauthenticated,

    /// Unknown or revoked credential. The two cases are never told apart.
    #[error("invalid or inactive API key")]
    InvalidOrInactiveKey,

    /// The downstream integration failed; nothing was charged.
    #[error("operation failed: {0}")]
    DelegateFailure(String),

    /// A usage record could not be persisted. Logged by the ledger, never surfaced to callers.
    #[error("ledger write failed: {0}")]
    LedgerWriteFailure(String),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("endpoint already registered: {0}")]
    DuplicateEndpoint(String),

    #[error("caller already has an API key: {0}")]
    CallerAlreadyRegistered(String),

    #[error("invalid caller id")]
    InvalidCallerId,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
