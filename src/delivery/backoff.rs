//! Reconnect delays
//!
//! `initial`, then `min(previous * backoff, limit)` on every further
//! attempt. The sequence is never reset, so a broker that keeps dropping
//! the connection is retried at the limit.

use crate::config::ReconnectConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: f64,
    factor: f64,
    limit: f64,
    current: Option<f64>,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial: config.initial.max(0.0),
            factor: config.backoff.max(1.0),
            limit: config.limit.max(config.initial).max(0.0),
            current: None,
        }
    }

    /// Wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(current) => (current * self.factor).min(self.limit),
        };
        self.current = Some(next);
        Duration::from_secs_f64(next)
    }

    /// Settling time after a successful connect
    pub fn initial(&self) -> Duration {
        Duration::from_secs_f64(self.initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(backoff: &mut Backoff, n: usize) -> Vec<u64> {
        (0..n).map(|_| backoff.next_delay().as_secs()).collect()
    }

    #[test]
    fn test_default_sequence() {
        let mut backoff = Backoff::new(&ReconnectConfig::default());
        assert_eq!(secs(&mut backoff, 7), vec![5, 10, 20, 40, 60, 60, 60]);
    }

    #[test]
    fn test_fractional_factor() {
        let mut backoff = Backoff::new(&ReconnectConfig {
            initial: 4.0,
            backoff: 1.5,
            limit: 10.0,
        });
        assert_eq!(secs(&mut backoff, 4), vec![4, 6, 9, 10]);
    }

    proptest! {
        #[test]
        fn prop_monotonic_and_bounded(
            initial in 0.1f64..30.0,
            factor in 1.0f64..4.0,
            extra in 0.0f64..100.0,
        ) {
            let limit = initial + extra;
            let mut backoff = Backoff::new(&ReconnectConfig { initial, backoff: factor, limit });
            let mut previous = Duration::ZERO;
            for _ in 0..20 {
                let d = backoff.next_delay();
                prop_assert!(d >= previous);
                prop_assert!(d.as_secs_f64() <= limit + 1e-9);
                previous = d;
            }
        }
    }
}
