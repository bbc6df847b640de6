//! Measurement schedulers
//!
//! A scheduler drives the sensing stacks on a fixed period. Every call to
//! [`Measurement::tick`] does one step of work and returns a [`Tick`]: how
//! long to wait before the next call and, when a window completed, the
//! output mapping.
//!
//! | Class | Stacks per tick | Output |
//! |---|---|---|
//! | `Single` | first stack | every tick |
//! | `SingleAvg` | first stack | average of `n_samples` ticks |
//! | `MultiMerged` | all, concurrently, merged | every tick |
//! | `MultiMergedAvg` | all, concurrently, merged | average of `n_samples` ticks |
//! | `MultiIndividual` | one, round-robin | every tick |
//! | `MultiIndividualAvg` | one, round-robin | per stack, average of `n_samples` rounds |
//!
//! A failing stack leaves the scheduler state untouched, so the same step
//! is retried on the next call.

pub mod average;
pub mod drift;
pub mod multi;
pub mod single;

pub use average::{average, Window};
pub use drift::{Clock, DriftCorrector, ManualClock, MonotonicClock};
pub use multi::{MultiIndividual, MultiMerged};
pub use single::SingleSample;

use crate::config::MeasurementConfig;
use crate::error::{RegistryError, Result, TelemetryError};
use crate::pipeline::{SensingStack, StackError};
use crate::types::Variables;
use async_trait::async_trait;
use std::time::Duration;

/// Registry module name for the built-in schedulers
pub const MODULE: &str = "sample";

/// Every built-in scheduler class
pub const CLASSES: [&str; 6] = [
    "Single",
    "SingleAvg",
    "MultiMerged",
    "MultiMergedAvg",
    "MultiIndividual",
    "MultiIndividualAvg",
];

/// Result of one scheduler step
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Wait before the next step
    pub delay: Duration,
    /// Present only when a window completed
    pub output: Option<Variables>,
}

#[async_trait]
pub trait Measurement: Send {
    /// Class name, used to attribute aggregation errors
    fn class(&self) -> &'static str;

    /// Take ownership of the sensing stacks to drive
    fn initialise(&mut self, stacks: Vec<SensingStack>) -> Result<()>;

    /// Run one step
    async fn tick(&mut self) -> Result<Tick>;
}

/// Build a scheduler from its config
pub fn build(config: &MeasurementConfig) -> std::result::Result<Box<dyn Measurement>, RegistryError> {
    let invalid = |message: &str| RegistryError::InvalidConfig {
        module: config.module.clone(),
        class: config.class.clone(),
        message: message.to_string(),
    };

    let period = config.config.period;
    let n_samples = config.config.n_samples;
    if !(period > 0.0 && period.is_finite()) {
        return Err(invalid("period must be a positive number of seconds"));
    }
    if n_samples == 0 {
        return Err(invalid("n_samples must be at least 1"));
    }

    let measurement: Box<dyn Measurement> = match config.class.as_str() {
        "Single" => Box::new(SingleSample::new(period, None)),
        "SingleAvg" => Box::new(SingleSample::new(period, Some(n_samples))),
        "MultiMerged" => Box::new(MultiMerged::new(period, None)),
        "MultiMergedAvg" => Box::new(MultiMerged::new(period, Some(n_samples))),
        "MultiIndividual" => Box::new(MultiIndividual::new(period, None)),
        "MultiIndividualAvg" => Box::new(MultiIndividual::new(period, Some(n_samples))),
        other => {
            return Err(RegistryError::UnknownClass {
                kind: "measurement",
                module: config.module.clone(),
                class: other.to_string(),
            })
        }
    };
    Ok(measurement)
}

/// Error for a tick on a scheduler with no stacks
pub(crate) fn not_initialised(class: &str) -> TelemetryError {
    TelemetryError::Measurement(format!("{} has no sensing stacks", class))
}

/// Averaging failures are reported like calculation errors of the scheduler
pub(crate) fn aggregation_error(class: &str, reason: String) -> TelemetryError {
    StackError::calculation(class, reason).into()
}
