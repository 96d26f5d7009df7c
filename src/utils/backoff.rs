use std::time::Duration;

/// Delay policy for a fixed-interval loop whose step can fail.
///
/// On success the loop waits `interval`. After the n-th consecutive failure it
/// waits `interval * 2^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    interval: Duration,
    max_delay: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(interval: Duration, max_delay: Duration) -> Self {
        Self {
            interval,
            max_delay: max_delay.max(interval),
            failures: 0,
        }
    }

    pub fn on_success(&mut self) -> Duration {
        self.failures = 0;
        self.interval
    }

    pub fn on_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let exponent = (self.failures - 1).min(16);
        self.interval
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap_then_resets() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(60));

        assert_eq!(backoff.on_failure(), Duration::from_secs(5));
        assert_eq!(backoff.on_failure(), Duration::from_secs(10));
        assert_eq!(backoff.on_failure(), Duration::from_secs(20));
        assert_eq!(backoff.on_failure(), Duration::from_secs(40));
        assert_eq!(backoff.on_failure(), Duration::from_secs(60));
        assert_eq!(backoff.on_failure(), Duration::from_secs(60));
        assert_eq!(backoff.consecutive_failures(), 6);

        assert_eq!(backoff.on_success(), Duration::from_secs(5));
        assert_eq!(backoff.consecutive_failures(), 0);
        assert_eq!(backoff.on_failure(), Duration::from_secs(5));
    }

    #[test]
    fn cap_never_below_interval() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.on_failure(), Duration::from_secs(5));
        assert_eq!(backoff.on_failure(), Duration::from_secs(5));
    }

    #[test]
    fn long_failure_streaks_do_not_overflow() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(3600));
        for _ in 0..1_000 {
            backoff.on_failure();
        }
        assert!(backoff.on_failure() <= Duration::from_secs(3600));
    }
}
