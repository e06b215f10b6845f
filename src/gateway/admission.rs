//! # Admission control
//!
//! 每个标识符一个滑动窗口：记录窗口内已放行请求的时间戳，
//! 超过上限的请求直接拒绝。窗口状态只存在于内存中，进程重启即丢失。

use std::collections::VecDeque;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::key_store::fingerprint;

/// Length of the rolling admission window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Source of monotonic time for the admission windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// Key of a rate window: the presented credential, or the caller's address when none was presented.
///
/// The two namespaces never share a budget, even if an address and a credential spell the same string.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Credential(String),
    Address(IpAddr),
    /// Neither a credential nor an address is known.
    Anonymous,
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Credential(secret) => write!(f, "key:{}", fingerprint(secret)),
            Identifier::Address(ip) => write!(f, "addr:{}", ip),
            Identifier::Anonymous => write!(f, "anonymous"),
        }
    }
}

// 不在日志或调试输出中暴露原始密钥
impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub struct AdmissionController {
    limit: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: DashMap<Identifier, VecDeque<Instant>>,
}

impl AdmissionController {
    /// `limit` requests per rolling [`WINDOW`], measured with the system clock.
    pub fn new(limit: usize) -> Self {
        Self::with_clock(limit, Arc::new(SystemClock))
    }

    pub fn with_clock(limit: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window: WINDOW,
            clock,
            windows: DashMap::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 放行则记录本次请求；否则返回 `RateLimitExceeded`，不影响其他标识符
    pub fn allow(&self, identifier: &Identifier) -> GatewayResult<()> {
        // entry 持有分片写锁，同一标识符的判定与记录是原子的
        let mut hits = self.windows.entry(identifier.clone()).or_default();
        let now = self.clock.now();
        evict_expired(&mut hits, now, self.window);

        if hits.len() >= self.limit {
            let retry_after = retry_after(&hits, now, self.window);
            warn!(
                identifier = %identifier,
                limit = self.limit,
                retry_after_ms = retry_after.as_millis() as u64,
                "Admission rejected, rate limit exceeded"
            );
            return Err(GatewayError::RateLimitExceeded { retry_after });
        }

        hits.push_back(now);
        debug!(identifier = %identifier, used = hits.len(), limit = self.limit, "Admitted");
        Ok(())
    }

    /// Time until `identifier` may be admitted again; zero when it has budget left.
    pub fn retry_after(&self, identifier: &Identifier) -> Duration {
        let Some(mut hits) = self.windows.get_mut(identifier) else {
            return Duration::ZERO;
        };
        let now = self.clock.now();
        evict_expired(&mut hits, now, self.window);
        if hits.len() < self.limit {
            Duration::ZERO
        } else {
            retry_after(&hits, now, self.window)
        }
    }

    /// 清理已经空闲的窗口，返回被移除的标识符数量
    pub fn purge_idle(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, hits| {
            evict_expired(hits, now, self.window);
            !hits.is_empty()
        });
        let remaining = self.windows.len();
        let purged = before.saturating_sub(remaining);
        if purged > 0 {
            debug!(purged, remaining, "Purged idle admission windows");
        }
        purged
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.windows.len()
    }
}

fn evict_expired(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = hits.front() {
        if now.saturating_duration_since(*oldest) >= window {
            hits.pop_front();
        } else {
            break;
        }
    }
}

fn retry_after(hits: &VecDeque<Instant>, now: Instant, window: Duration) -> Duration {
    hits.front()
        .map(|oldest| window.saturating_sub(now.saturating_duration_since(*oldest)))
        .unwrap_or(window)
}
