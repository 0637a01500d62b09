//! Retry, timeout and pacing policy for delivery workers.

use std::time::Duration;

/// Exponential retry backoff.
///
/// The delay before retry `n` (0-indexed) is `first × factor^n`, clamped to
/// `max`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// 1s, 2s, 4s, ... capped at 30s.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// No waiting between retries.
    pub fn none() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn next(&self, retry: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = retry.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// How a worker paces and retries deliveries.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliveryPolicy {
    /// Attempts per recipient, including the first.
    pub max_attempts: u32,
    /// Delay between attempts for one recipient.
    pub backoff: BackoffPolicy,
    /// Timeout applied to each attempt independently.
    pub attempt_timeout: Duration,
    /// Pause between recipients while the transport is healthy.
    pub base_delay: Duration,
    /// Cap on the exponent of the error slowdown (`base_delay × 2^n`).
    pub max_slowdown_exponent: u32,
    /// Wall-clock limit for one worker run; `None` runs until the queue drains.
    pub run_budget: Option<Duration>,
    /// Log a progress line every this many recipients.
    pub progress_every: u64,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            attempt_timeout: Duration::from_secs(10),
            base_delay: Duration::from_millis(250),
            max_slowdown_exponent: 4,
            run_budget: Some(Duration::from_secs(300)),
            progress_every: 10,
        }
    }
}

impl DeliveryPolicy {
    /// Same retry semantics with every wait removed.
    pub fn immediate() -> Self {
        Self {
            backoff: BackoffPolicy::none(),
            base_delay: Duration::ZERO,
            run_budget: None,
            ..Self::default()
        }
    }

    /// Target a steady request rate; `0` disables pacing.
    pub fn with_rate_per_sec(mut self, rate: f64) -> Self {
        self.base_delay = if rate > 0.0 && rate.is_finite() {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        };
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_run_budget(mut self, budget: Option<Duration>) -> Self {
        self.run_budget = budget;
        self
    }

    /// Pause before the next recipient after `consecutive_errors` terminal
    /// failures in a row.
    pub fn pacing_delay(&self, consecutive_errors: u32) -> Duration {
        let exp = consecutive_errors.min(self.max_slowdown_exponent);
        self.base_delay.saturating_mul(1u32 << exp.min(31))
    }
}
