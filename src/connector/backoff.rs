use std::time::Duration;

/// Exponential backoff between connection attempts: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_ms: 1_000, max_ms: 10_000 }
    }
}

impl BackoffPolicy {
    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(32);
        let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(multiplier).min(self.max_ms))
    }
}
