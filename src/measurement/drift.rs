//! Drift-compensated wake delays
//!
//! A cycle of `n_samples` ticks should take exactly one period. Each tick
//! aims for its slot inside the cycle:
//!
//! ```text
//! next_target = ((slot + 1) / n_samples) * period + anchor
//! base_delay  = next_target - now
//! adjustment += 0.2 * (previous_target - now)      (skipped on the first tick)
//! delay       = base_delay + adjustment
//! ```
//!
//! The anchor is re-taken at slot 0, so errors never accumulate across
//! cycles. Running late makes `previous_target - now` negative, which
//! shortens the following delays until the schedule catches up. A delay
//! that would be negative resets the adjustment and is clamped to zero.

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Share of the last miss folded into the adjustment each tick
pub const DRIFT_GAIN: f64 = 0.2;

/// Source of monotonic time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Monotonic clock backed by `tokio::time`, so paused test runtimes
/// control it too
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += secs;
        }
    }

    pub fn set(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now = secs;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.lock().map(|n| *n).unwrap_or(0.0)
    }
}

/// Shared delay computation for every scheduler variant
pub struct DriftCorrector {
    period: f64,
    n_samples: usize,
    clock: Box<dyn Clock>,
    anchor: Option<f64>,
    previous_target: Option<f64>,
    adjustment: f64,
}

impl DriftCorrector {
    pub fn new(period: f64, n_samples: usize) -> Self {
        Self::with_clock(period, n_samples, Box::new(MonotonicClock::default()))
    }

    pub fn with_clock(period: f64, n_samples: usize, clock: Box<dyn Clock>) -> Self {
        Self {
            period,
            n_samples: n_samples.max(1),
            clock,
            anchor: None,
            previous_target: None,
            adjustment: 0.0,
        }
    }

    pub fn adjustment(&self) -> f64 {
        self.adjustment
    }

    /// Delay until the tick after `slot` (0-based position in the cycle)
    pub fn next_delay(&mut self, slot: usize) -> Duration {
        let now = self.clock.now();

        let anchor = match self.anchor {
            Some(anchor) if slot != 0 => anchor,
            _ => now,
        };
        self.anchor = Some(anchor);

        let fraction = (slot + 1) as f64 / self.n_samples as f64;
        let next_target = fraction * self.period + anchor;
        let base_delay = next_target - now;

        match self.previous_target {
            Some(previous) => self.adjustment += DRIFT_GAIN * (previous - now),
            None => self.adjustment = 0.0,
        }

        let mut delay = base_delay + self.adjustment;
        if delay < 0.0 {
            tracing::warn!("Negative delay ({:.3}s) - resetting drift adjustment", delay);
            self.adjustment = 0.0;
            delay = base_delay.max(0.0);
        }

        self.previous_target = Some(next_target);
        tracing::trace!(
            "slot {} target {:.3} base {:.3} adjustment {:.3}",
            slot,
            next_target,
            base_delay,
            self.adjustment
        );
        Duration::from_secs_f64(delay.max(0.0))
    }
}
