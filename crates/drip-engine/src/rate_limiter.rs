use std::sync::Arc;

use drip_contract::RateLimitCeilings;
use drip_store::RateCounterStore;

const WINDOWS: [(&str, u64); 3] = [
    ("sec", 1_000),
    ("min", 60_000),
    ("hour", 3_600_000),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub granted: bool,
    /// Milliseconds until the most constrained exhausted window resets.
    /// Zero when granted.
    pub retry_after_ms: u64,
}

/// Fixed-window limiter over the shared counter store.
///
/// Each check increments all three windows and grants only when every
/// ceiling holds. A denied check still consumes its increments; with
/// counters shared across processes a conditional decrement would race, and
/// the overcount only makes the limiter stricter.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateCounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateCounterStore>) -> Self {
        Self { store }
    }

    pub fn check_and_consume(
        &self,
        tenant_id: &str,
        provider: &str,
        ceilings: &RateLimitCeilings,
        now_unix_ms: u64,
    ) -> RateLimitDecision {
        let mut retry_after_ms = 0u64;
        for (label, window_ms) in WINDOWS {
            let ceiling = match label {
                "sec" => ceilings.per_second,
                "min" => ceilings.per_minute,
                _ => ceilings.per_hour,
            };
            if ceiling == 0 {
                continue;
            }
            let window_start = now_unix_ms - now_unix_ms % window_ms;
            let key = format!("rate:{tenant_id}:{provider}:{label}:{window_start}");
            let count = self.store.increment_with_expiry(&key, window_ms, now_unix_ms);
            if count > u64::from(ceiling) {
                let resets_in = window_start.saturating_add(window_ms).saturating_sub(now_unix_ms);
                retry_after_ms = retry_after_ms.max(resets_in);
            }
        }
        RateLimitDecision {
            granted: retry_after_ms == 0,
            retry_after_ms,
        }
    }
}
