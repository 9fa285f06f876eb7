//! Retry ceiling, linear backoff and pre-request jitter for the dispatcher.

use std::time::Duration;

/// Retry policy with linear backoff on throttling.
///
/// Delay schedule: `attempt * backoff_unit`, i.e. 10s, 20s, 30s by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per batch, including the first.
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    /// Also retry transient non-throttling errors (network, timeout, 5xx).
    pub retry_transient: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(10),
            retry_transient: false,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given attempt number (1-indexed) was throttled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt.max(1))
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn with_retry_transient(mut self, enabled: bool) -> Self {
        self.retry_transient = enabled;
        self
    }
}

/// Uniform random delay applied before every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Default for Jitter {
    /// Uniform 1 to 3 seconds.
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(3),
        }
    }
}

impl Jitter {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// No delay at all.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Draw one delay in `[min, max)` (exactly `min` when the range is empty).
    pub fn sample(&self) -> Duration {
        let spread = self.max.saturating_sub(self.min).as_millis() as u64;
        self.min + Duration::from_millis(rand_jitter_ms(spread))
    }
}

// ---------------------------------------------------------------------------
// Xorshift jitter source seeded from the current time.
// ---------------------------------------------------------------------------

fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    // Not suitable for cryptographic use.
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x |= 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
