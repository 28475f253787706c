//! Retry budgets and backoff delays.

use std::time::Duration;

use lllm_config::LllmConfig;
use rand::Rng;

/// Upper bound on rounds when `max_interrupt_times` is 0.
pub const UNBOUNDED_ROUNDS: usize = 10_000;

/// Per-call retry budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLimits {
    /// Retries of one turn after a contract violation
    pub max_exception_retry: u32,
    /// Tool-call rounds before the final answer is forced (0 = unbounded)
    pub max_interrupt_times: u32,
    /// Retries of transient provider failures
    pub max_llm_recall: u32,
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            max_exception_retry: 3,
            max_interrupt_times: 5,
            max_llm_recall: 0,
        }
    }
}

impl RetryLimits {
    pub fn from_config(config: &LllmConfig) -> Self {
        Self {
            max_exception_retry: config.max_exception_retry,
            max_interrupt_times: config.max_interrupt_times,
            max_llm_recall: config.max_llm_recall,
        }
    }

    /// Outer rounds of one call: every interrupt round plus the final answer.
    pub fn rounds(&self) -> usize {
        if self.max_interrupt_times == 0 {
            UNBOUNDED_ROUNDS
        } else {
            self.max_interrupt_times as usize + 1
        }
    }

    /// Whether `round` (0-based) is the last one allowed to request tools.
    pub fn is_last_interrupt(&self, round: usize) -> bool {
        self.max_interrupt_times > 0 && round + 1 == self.max_interrupt_times as usize
    }
}

/// Sleep durations between retries.
///
/// Rate-limit waits are drawn uniformly from `rate_limit_min..=rate_limit_max`
/// and never consume a budget. Other transient failures wait `recall_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub rate_limit_min: Duration,
    pub rate_limit_max: Duration,
    pub recall_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit_min: Duration::from_secs(1),
            rate_limit_max: Duration::from_secs(16),
            recall_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// No waiting at all.
    pub fn none() -> Self {
        Self {
            rate_limit_min: Duration::ZERO,
            rate_limit_max: Duration::ZERO,
            recall_delay: Duration::ZERO,
        }
    }

    pub fn rate_limit_delay(&self) -> Duration {
        let min = self.rate_limit_min.as_millis() as u64;
        let max = (self.rate_limit_max.as_millis() as u64).max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}
