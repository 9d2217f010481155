use std::time::Duration;

/// Fixed part of the drift allowance, on top of the TTL fraction.
const CLOCK_DRIFT_MARGIN: Duration = Duration::from_millis(2);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct QuorumConfig {
    /// Give up acquiring after this long. Also the time the critical section
    /// is expected to need.
    pub timeout: Duration,
    /// Lifetime of each lease. Defaults to `timeout` plus one second.
    pub lease_ttl: Duration,
    /// How long one round waits for the servers to answer.
    pub server_timeout: Duration,
    /// Share of `lease_ttl` assumed lost to clock drift between hosts.
    pub drift_factor: f64,
    /// Bounds of the random pause between acquisition rounds.
    pub retry_min: Duration,
    pub retry_max: Duration,
    /// Stop retrying as soon as too many servers are unavailable for a
    /// majority to be possible, instead of waiting for `timeout`.
    pub fail_fast: bool,
    /// Prepended to the lock name to form the key stored on the servers.
    pub key_prefix: String,
}

impl QuorumConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            lease_ttl: timeout + Duration::from_secs(1),
            server_timeout: Duration::from_millis(50),
            drift_factor: 0.01,
            retry_min: Duration::from_millis(10),
            retry_max: Duration::from_millis(100),
            fail_fast: false,
            key_prefix: "lock_".to_string(),
        }
    }

    pub fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.lease_ttl = lease_ttl;
        self
    }

    pub fn with_server_timeout(mut self, server_timeout: Duration) -> Self {
        self.server_timeout = server_timeout;
        self
    }

    /// Clamped to `0.0..=1.0`; non-finite values are ignored.
    pub fn with_drift_factor(mut self, drift_factor: f64) -> Self {
        if drift_factor.is_finite() {
            self.drift_factor = drift_factor.clamp(0.0, 1.0);
        }
        self
    }

    pub fn with_retry_delay(mut self, min: Duration, max: Duration) -> Self {
        self.retry_min = min.min(max);
        self.retry_max = max.max(min);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Time subtracted from a lease's nominal lifetime for clock drift.
    pub fn drift(&self) -> Duration {
        self.lease_ttl.mul_f64(self.drift_factor) + CLOCK_DRIFT_MARGIN
    }

    /// How long a lease written `elapsed` ago is still verifiably valid.
    ///
    /// `None` once nothing is left.
    pub fn remaining_validity(&self, elapsed: Duration) -> Option<Duration> {
        self.lease_ttl
            .checked_sub(elapsed + self.drift())
            .filter(|remaining| !remaining.is_zero())
    }
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}
