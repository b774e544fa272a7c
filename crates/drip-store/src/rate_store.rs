use std::collections::BTreeMap;
use std::sync::Mutex;

/// Counter backend for fixed-window rate accounting.
///
/// The single operation is an increment that also creates the window on
/// first use: callers derive the key from the window start, so an expired
/// window is simply a new key and stale windows are garbage-collected
/// opportunistically. A Redis realization maps this to `INCR` + `PEXPIRE`.
pub trait RateCounterStore: Send + Sync {
    /// Increments the counter behind `key`, creating it with the given
    /// lifetime when absent, and returns the post-increment value.
    fn increment_with_expiry(&self, key: &str, ttl_ms: u64, now_unix_ms: u64) -> u64;
}

#[derive(Debug, Default)]
pub struct InMemoryRateCounterStore {
    // key -> (expires_at_unix_ms, count)
    inner: Mutex<BTreeMap<String, (u64, u64)>>,
}

impl InMemoryRateCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateCounterStore for InMemoryRateCounterStore {
    fn increment_with_expiry(&self, key: &str, ttl_ms: u64, now_unix_ms: u64) -> u64 {
        let Ok(mut inner) = self.inner.lock() else {
            return 1;
        };
        inner.retain(|_, (expires_at, _)| *expires_at > now_unix_ms);
        let slot = inner
            .entry(key.to_string())
            .or_insert((now_unix_ms.saturating_add(ttl_ms), 0));
        slot.1 = slot.1.saturating_add(1);
        slot.1
    }
}
