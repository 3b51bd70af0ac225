//! Connector Configuration - passed in by the host at construction

use super::backoff::BackoffPolicy;
use std::time::Duration;

pub const ENV_REQUEST_TIMEOUT_MS: &str = "BEECONNECT_REQUEST_TIMEOUT_MS";
pub const ENV_MAX_ATTEMPTS: &str = "BEECONNECT_MAX_ATTEMPTS";
pub const ENV_SCAN_INTERVAL_MS: &str = "BEECONNECT_SCAN_INTERVAL_MS";
pub const ENV_VERBOSE: &str = "BEECONNECT_VERBOSE";

/// Connector configuration. `verbose` replaces any process-wide debug toggle.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Bound on each handshake request (accounts, chain id).
    pub request_timeout: Duration,
    /// Bound on the optional set-address side channel.
    pub set_address_timeout: Duration,
    /// Total connection attempts, first one included.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Provider rescan period. Zero disables the timer.
    pub scan_interval: Duration,
    pub verbose: bool,
    /// Capacity of the notification broadcast.
    pub event_capacity: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            set_address_timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            scan_interval: Duration::from_secs(3),
            verbose: false,
            event_capacity: 64,
        }
    }
}

impl ConnectorConfig {
    pub fn new() -> Self { Self::default() }

    /// Defaults overridden by `BEECONNECT_*` variables. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_u64(ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64(ENV_MAX_ATTEMPTS) {
            config.max_attempts = n.clamp(1, u32::MAX as u64) as u32;
        }
        if let Some(ms) = env_u64(ENV_SCAN_INTERVAL_MS) {
            config.scan_interval = Duration::from_millis(ms);
        }
        if let Ok(v) = std::env::var(ENV_VERBOSE) {
            config.verbose = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        config
    }

    pub fn with_request_timeout(mut self, t: Duration) -> Self { self.request_timeout = t; self }
    pub fn with_set_address_timeout(mut self, t: Duration) -> Self { self.set_address_timeout = t; self }
    pub fn with_max_attempts(mut self, n: u32) -> Self { self.max_attempts = n.max(1); self }
    pub fn with_backoff(mut self, b: BackoffPolicy) -> Self { self.backoff = b; self }
    pub fn with_scan_interval(mut self, t: Duration) -> Self { self.scan_interval = t; self }
    pub fn with_verbose(mut self, v: bool) -> Self { self.verbose = v; self }
    pub fn with_event_capacity(mut self, n: usize) -> Self { self.event_capacity = n.max(1); self }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}
