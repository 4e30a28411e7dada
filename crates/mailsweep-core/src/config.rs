//! Engine and connection tuning.
//!
//! Every numeric knob lives here with its default; nothing else in the crate
//! hard-codes a limit.

use std::time::Duration;

/// Exponential backoff parameters for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per retry.
    pub factor: u32,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Sets the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the first delay.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub const fn with_factor(mut self, factor: u32) -> Self {
        self.factor = factor;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Starts a fresh attempt counter.
    #[must_use]
    pub const fn backoff(self) -> Backoff {
        Backoff {
            policy: self,
            retries: 0,
        }
    }
}

/// Bounded retry state machine.
///
/// Each call to [`Backoff::next_delay`] consumes one retry and returns how
/// long to wait, or `None` once the budget is spent.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    retries: u32,
}

impl Backoff {
    /// Returns the delay before the next retry, or `None` when exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        let multiplier = self.policy.factor.saturating_pow(self.retries);
        let delay = self
            .policy
            .base_delay
            .saturating_mul(multiplier)
            .min(self.policy.max_delay);
        self.retries += 1;
        Some(delay)
    }

    /// Retries consumed so far.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }
}

/// Session pool and protocol timing.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum concurrent sessions, and so the number of workers.
    pub pool_size: usize,
    /// Deadline for any single command, including connect.
    pub command_timeout: Duration,
    /// Parked sessions idle longer than this are probed with NOOP before reuse.
    pub idle_timeout: Duration,
    /// Backoff for transient failures.
    pub retry: RetryPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            command_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(600),
            retry: RetryPolicy::default(),
        }
    }
}

impl ConnectionConfig {
    /// Sets the pool size. Zero is raised to one.
    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the idle probe threshold.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Run shape and bookkeeping.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// UIDs per mutation chunk.
    pub chunk_size: usize,
    /// UIDs per metadata FETCH.
    pub fetch_batch_size: usize,
    /// Failed chunks at or above this count are not retried on resume.
    pub max_chunk_failures: u32,
    /// Destination for `Archive` on servers without Gmail labels.
    pub archive_mailbox: String,
    /// Keep completed runs in the checkpoint store instead of deleting them.
    pub retain_completed: bool,
    /// Candidates shown from each end of the list before mutating.
    pub preview_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            fetch_batch_size: 500,
            max_chunk_failures: 3,
            archive_mailbox: "Archive".to_string(),
            retain_completed: false,
            preview_size: 5,
        }
    }
}

impl EngineConfig {
    /// Sets the chunk size. Zero is raised to one.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Sets the metadata batch size. Zero is raised to one.
    #[must_use]
    pub fn with_fetch_batch_size(mut self, size: usize) -> Self {
        self.fetch_batch_size = size.max(1);
        self
    }

    /// Sets the failure threshold for resume.
    #[must_use]
    pub const fn with_max_chunk_failures(mut self, failures: u32) -> Self {
        self.max_chunk_failures = failures;
        self
    }

    /// Sets the archive mailbox.
    #[must_use]
    pub fn with_archive_mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.archive_mailbox = mailbox.into();
        self
    }

    /// Keeps completed runs.
    #[must_use]
    pub const fn with_retain_completed(mut self, retain: bool) -> Self {
        self.retain_completed = retain;
        self
    }

    /// Sets the preview length.
    #[must_use]
    pub const fn with_preview_size(mut self, size: usize) -> Self {
        self.preview_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_sequence() {
        let mut backoff = RetryPolicy::default().backoff();
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay())
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert_eq!(backoff.retries(), 5);
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default()
            .with_max_retries(10)
            .with_factor(10)
            .with_max_delay(Duration::from_secs(60));
        let mut backoff = policy.backoff();
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay())
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![1, 10, 60, 60, 60, 60, 60, 60, 60, 60]);
    }

    #[test]
    fn zero_budget_never_retries() {
        let mut backoff = RetryPolicy::default().with_max_retries(0).backoff();
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn sizes_are_clamped() {
        assert_eq!(EngineConfig::default().with_chunk_size(0).chunk_size, 1);
        assert_eq!(ConnectionConfig::default().with_pool_size(0).pool_size, 1);
    }
}
