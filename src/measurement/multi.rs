//! Schedulers over several sensing stacks
//!
//! - [`MultiMerged`]: every stack each tick, sampled concurrently, outputs
//!   union-merged (later stacks win on key clashes)
//! - [`MultiIndividual`]: one stack per tick in round-robin order; the
//!   period is charged once per round

use super::{aggregation_error, not_initialised, DriftCorrector, Measurement, Tick, Window};
use crate::error::Result;
use crate::pipeline::SensingStack;
use crate::types::Variables;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::time::Duration;

// ==================== Merged ====================

pub struct MultiMerged {
    stacks: Vec<SensingStack>,
    window: Option<Window>,
    drift: DriftCorrector,
}

impl MultiMerged {
    pub fn new(period: f64, n_samples: Option<usize>) -> Self {
        Self::with_drift(
            n_samples,
            DriftCorrector::new(period, n_samples.unwrap_or(1)),
        )
    }

    pub fn with_drift(n_samples: Option<usize>, drift: DriftCorrector) -> Self {
        Self {
            stacks: Vec::new(),
            window: n_samples.map(Window::new),
            drift,
        }
    }
}

#[async_trait]
impl Measurement for MultiMerged {
    fn class(&self) -> &'static str {
        if self.window.is_some() {
            "MultiMergedAvg"
        } else {
            "MultiMerged"
        }
    }

    fn initialise(&mut self, stacks: Vec<SensingStack>) -> Result<()> {
        if stacks.is_empty() {
            return Err(not_initialised(self.class()));
        }
        self.stacks = stacks;
        Ok(())
    }

    async fn tick(&mut self) -> Result<Tick> {
        let class = self.class();
        if self.stacks.is_empty() {
            return Err(not_initialised(class));
        }

        let results = try_join_all(self.stacks.iter().map(|s| s.execute())).await?;
        let mut merged = Variables::new();
        for result in results {
            merged.extend(result);
        }

        match self.window.as_mut() {
            None => Ok(Tick {
                delay: self.drift.next_delay(0),
                output: Some(merged),
            }),
            Some(window) => {
                let slot = window.len();
                window.push(merged);
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

// ==================== Individual ====================

pub struct MultiIndividual {
    stacks: Vec<SensingStack>,
    /// Per-stack windows when averaging
    windows: Option<Vec<Window>>,
    n_samples: usize,
    next_stack: usize,
    round: usize,
    drift: DriftCorrector,
}

impl MultiIndividual {
    pub fn new(period: f64, n_samples: Option<usize>) -> Self {
        Self::with_drift(
            n_samples,
            DriftCorrector::new(period, n_samples.unwrap_or(1)),
        )
    }

    pub fn with_drift(n_samples: Option<usize>, drift: DriftCorrector) -> Self {
        Self {
            stacks: Vec::new(),
            windows: n_samples.map(|_| Vec::new()),
            n_samples: n_samples.unwrap_or(1).max(1),
            next_stack: 0,
            round: 0,
            drift,
        }
    }

    /// Index of the stack the next tick samples
    pub fn next_stack(&self) -> usize {
        self.next_stack
    }
}

#[async_trait]
impl Measurement for MultiIndividual {
    fn class(&self) -> &'static str {
        if self.windows.is_some() {
            "MultiIndividualAvg"
        } else {
            "MultiIndividual"
        }
    }

    fn initialise(&mut self, stacks: Vec<SensingStack>) -> Result<()> {
        if stacks.is_empty() {
            return Err(not_initialised(self.class()));
        }
        if let Some(windows) = self.windows.as_mut() {
            *windows = stacks.iter().map(|_| Window::new(self.n_samples)).collect();
        }
        self.stacks = stacks;
        self.next_stack = 0;
        self.round = 0;
        Ok(())
    }

    async fn tick(&mut self) -> Result<Tick> {
        let class = self.class();
        let index = self.next_stack;
        let stack = self
            .stacks
            .get(index)
            .ok_or_else(|| not_initialised(class))?;
        let sample = stack.execute().await?;

        let last_round = self.round + 1 == self.n_samples;
        let output = match self.windows.as_mut() {
            None => Some(Ok(sample)),
            Some(windows) => {
                let window = &mut windows[index];
                window.push(sample);
                last_round.then(|| window.drain_average())
            }
        };

        self.next_stack += 1;
        let mut delay = Duration::ZERO;
        if self.next_stack >= self.stacks.len() {
            self.next_stack = 0;
            delay = self.drift.next_delay(self.round);
            self.round = (self.round + 1) % self.n_samples;
            if self.round == 0 {
                if let Some(windows) = self.windows.as_mut() {
                    windows.iter_mut().for_each(Window::clear);
                }
            }
        }

        let output = output
            .transpose()
            .map_err(|reason| aggregation_error(class, reason))?;
        Ok(Tick { delay, output })
    }
}
