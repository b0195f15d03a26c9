//! Bounded retry with linear backoff

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Ceiling for automatic retries
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledRetry {
    pub attempt: u32,
    pub delay: Duration,
}

/// Retry counter and backoff timer for one playback session
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    attempts: u32,
    deadline: Option<Instant>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            deadline: None,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_retries
    }

    /// Schedule an automatic retry. Returns `None` once the ceiling is reached.
    pub fn schedule(&mut self, now: Instant) -> Option<ScheduledRetry> {
        if self.is_exhausted() {
            self.deadline = None;
            return None;
        }
        self.attempts += 1;
        let delay = self.policy.delay_for(self.attempts);
        self.deadline = Some(now + delay);
        Some(ScheduledRetry {
            attempt: self.attempts,
            delay,
        })
    }

    /// User-triggered retry: counted, not bounded, runs immediately
    pub fn record_manual(&mut self) -> u32 {
        self.deadline = None;
        self.attempts += 1;
        self.attempts
    }

    /// Fire a scheduled retry early. The attempt was counted when it was scheduled.
    pub fn take_pending(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Consume the pending retry if its deadline has passed
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn pending_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> RetryController {
        RetryController::new(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        })
    }

    #[test]
    fn test_linear_backoff() {
        let mut retry = controller();
        let now = Instant::now();
        assert_eq!(retry.attempts(), 0);

        let first = retry.schedule(now).unwrap();
        assert_eq!(first.attempt, 1);
        assert_eq!(first.delay, Duration::from_secs(2));

        let second = retry.schedule(now).unwrap();
        assert_eq!(second.attempt, 2);
        assert_eq!(second.delay, Duration::from_secs(4));

        let third = retry.schedule(now).unwrap();
        assert_eq!(third.delay, Duration::from_secs(6));
        assert!(retry.is_exhausted());
        assert!(retry.schedule(now).is_none());
        assert_eq!(retry.attempts(), 3);
    }

    #[test]
    fn test_take_due_fires_once() {
        let mut retry = controller();
        let now = Instant::now();
        retry.schedule(now).unwrap();

        assert!(!retry.take_due(now + Duration::from_millis(1999)));
        assert!(retry.take_due(now + Duration::from_secs(2)));
        assert!(!retry.take_due(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_cancel_clears_timer_but_keeps_count() {
        let mut retry = controller();
        let now = Instant::now();
        retry.schedule(now).unwrap();
        retry.cancel();
        assert!(retry.pending_deadline().is_none());
        assert!(!retry.take_due(now + Duration::from_secs(60)));
        assert_eq!(retry.attempts(), 1);
    }

    #[test]
    fn test_manual_retry_is_unbounded() {
        let mut retry = controller();
        for expected in 1..=5 {
            assert_eq!(retry.record_manual(), expected);
        }
        assert!(retry.is_exhausted());
        assert!(retry.pending_deadline().is_none());
    }

    #[test]
    fn test_take_pending_does_not_count_again() {
        let mut retry = controller();
        let now = Instant::now();
        assert!(!retry.take_pending());

        retry.schedule(now).unwrap();
        assert!(retry.take_pending());
        assert_eq!(retry.attempts(), 1);
        assert!(!retry.take_due(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_reset() {
        let mut retry = controller();
        retry.schedule(Instant::now());
        retry.reset();
        assert_eq!(retry.attempts(), 0);
        assert!(retry.pending_deadline().is_none());
    }
}
