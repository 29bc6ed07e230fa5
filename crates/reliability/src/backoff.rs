//! Reconnect backoff: exponential with bounded maximum and jitter.
//!
//! Jitter spreads reconnect attempts of multiple relay processes after a
//! shared broker outage, avoiding a reconnection storm.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    /// `jitter` is the uniform fraction applied around each delay, within
    /// [0, 1).
    pub fn new(initial: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            initial,
            max,
            jitter,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, doubling each call up to the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.attempt.min(31);
        self.attempt = self.attempt.saturating_add(1);

        let base = self
            .initial
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max);

        if self.jitter <= 0.0 {
            return base;
        }

        let factor = 1.0 + rand::rng().random_range(-self.jitter..self.jitter);
        Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
    }

    /// Forget past failures after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_without_jitter() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 0.0);
        assert_eq!(b.next_delay(), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(2));
        assert_eq!(b.next_delay(), Duration::from_secs(4));
        assert_eq!(b.next_delay(), Duration::from_secs(8));
    }

    #[test]
    fn test_caps_at_max() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(5), 0.0);
        for _ in 0..10 {
            assert!(b.next_delay() <= Duration::from_secs(5));
        }
        assert_eq!(b.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_reset() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 0.0);
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut b = Backoff::new(Duration::from_secs(10), Duration::from_secs(60), 0.2);
        for _ in 0..100 {
            b.reset();
            let d = b.next_delay().as_secs_f64();
            assert!((8.0..=12.0).contains(&d), "jittered delay {d} out of range");
        }
    }

    #[test]
    fn test_no_overflow_on_many_attempts() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 0.0);
        for _ in 0..1000 {
            let _ = b.next_delay();
        }
        assert_eq!(b.next_delay(), Duration::from_secs(60));
    }
}
