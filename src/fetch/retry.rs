use std::time::Duration;

/// Bounded exponential backoff.
///
/// `max_attempts` counts every request, including the first one, so a policy
/// with `max_attempts = 3` sleeps at most twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy with no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Attempts actually made; a zero budget still makes one request.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retrying after the zero-based `attempt` failed.
    ///
    /// A server-provided `Retry-After` wins over the computed backoff but is
    /// still capped by `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = retry_after.unwrap_or_else(|| {
            let factor = 2u32.saturating_pow(attempt);
            self.base_delay.saturating_mul(factor)
        });
        computed.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for(0, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4, None), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40, None), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_after_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(600))),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_zero_attempts_still_makes_one_request() {
        assert_eq!(RetryPolicy::immediate(0).attempts(), 1);
    }
}
