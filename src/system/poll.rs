//! Retry pacing for the node-readiness and address-convergence loops

use std::time::Duration;

use async_trait::async_trait;

/// Default delay between poll attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How often to poll and when to give up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between attempts
    pub interval: Duration,

    /// Attempt ceiling; `None` polls until the platform converges
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    /// Poll forever at the default interval
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// True once `attempt` (1-based) has used up the ceiling
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

// ============================================================================
// SBIO: Injected sleep so poll loops run without real delay in tests
// ============================================================================

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded_five_seconds() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, None);
        assert!(!policy.exhausted(u32::MAX));
    }

    #[test]
    fn test_ceiling() {
        let policy = PollPolicy::unbounded().with_max_attempts(3);
        assert!(!policy.exhausted(1));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
    }
}
