use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Backoff policy for transient send failures within one step.
pub struct DispatchRetryPolicy {
    /// Attempts per step before the run fails, counting the first send.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound on deterministic jitter; zero disables it.
    pub jitter_ms: u64,
}

impl Default for DispatchRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 30_000,
            max_delay_ms: 900_000,
            jitter_ms: 0,
        }
    }
}

impl DispatchRetryPolicy {
    /// Delay before retry number `attempt` (1-based; attempt 1 is the first
    /// retry). Doubles per attempt, capped, with jitter derived from the
    /// seed so replays of the same run produce the same schedule.
    pub fn delay_ms(&self, attempt: u32, jitter_seed: &str) -> u64 {
        if self.base_delay_ms == 0 {
            return 0;
        }
        let exponent = attempt.saturating_sub(1).min(10);
        let base_delay = self
            .base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_ms);
        if self.jitter_ms == 0 {
            return base_delay;
        }
        let mut hasher = Sha256::new();
        hasher.update(jitter_seed.as_bytes());
        hasher.update(attempt.to_le_bytes());
        let digest = hasher.finalize();
        let mut seed_bytes = [0_u8; 8];
        seed_bytes.copy_from_slice(&digest[..8]);
        let deterministic_jitter = u64::from_le_bytes(seed_bytes) % self.jitter_ms.saturating_add(1);
        base_delay.saturating_add(deterministic_jitter).min(self.max_delay_ms)
    }
}
