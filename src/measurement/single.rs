//! `Single` and `SingleAvg`: one sensing stack

use super::{aggregation_error, not_initialised, DriftCorrector, Measurement, Tick, Window};
use crate::error::Result;
use crate::pipeline::SensingStack;
use async_trait::async_trait;

/// Samples one stack per tick; with a window, emits its average every
/// `n_samples` ticks
pub struct SingleSample {
    stack: Option<SensingStack>,
    window: Option<Window>,
    drift: DriftCorrector,
}

impl SingleSample {
    /// `n_samples: None` emits every sample unchanged
    pub fn new(period: f64, n_samples: Option<usize>) -> Self {
        Self::with_drift(
            n_samples,
            DriftCorrector::new(period, n_samples.unwrap_or(1)),
        )
    }

    pub fn with_drift(n_samples: Option<usize>, drift: DriftCorrector) -> Self {
        Self {
            stack: None,
            window: n_samples.map(Window::new),
            drift,
        }
    }
}

#[async_trait]
impl Measurement for SingleSample {
    fn class(&self) -> &'static str {
        if self.window.is_some() {
            "SingleAvg"
        } else {
            "Single"
        }
    }

    fn initialise(&mut self, stacks: Vec<SensingStack>) -> Result<()> {
        if stacks.len() > 1 {
            tracing::warn!(
                "{} drives one sensing stack; using the first of {}",
                self.class(),
                stacks.len()
            );
        }
        self.stack = stacks.into_iter().next();
        if self.stack.is_none() {
            return Err(not_initialised(self.class()));
        }
        Ok(())
    }

    async fn tick(&mut self) -> Result<Tick> {
        let class = self.class();
        let stack = self.stack.as_ref().ok_or_else(|| not_initialised(class))?;
        let sample = stack.execute().await?;

        match self.window.as_mut() {
            None => Ok(Tick {
                delay: self.drift.next_delay(0),
                output: Some(sample),
            }),
            Some(window) => {
                let slot = window.len();
                window.push(sample);
                let delay = self.drift.next_delay(slot);

                let output = if window.is_full() {
                    Some(
                        window
                            .drain_average()
                            .map_err(|reason| aggregation_error(class, reason))?,
                    )
                } else {
                    None
                };
                Ok(Tick { delay, output })
            }
        }
    }
}
