//! One device bound to one pipeline

use super::chain::Pipeline;
use super::error::{StackError, StackResult};
use crate::capability::SharedDevice;
use crate::config::SensingStackConfig;
use crate::types::Variables;
use std::collections::HashMap;
use std::sync::Arc;

/// A device, the pipeline its samples go through, plus optional constants
/// and key prefix.
pub struct SensingStack {
    config: SensingStackConfig,
    device: Option<SharedDevice>,
    pipeline: Option<Arc<Pipeline>>,
}

impl SensingStack {
    pub fn new(config: SensingStackConfig) -> Self {
        Self {
            config,
            device: None,
            pipeline: None,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.config.device
    }

    /// Bind the configured device and pipeline.
    ///
    /// Missing entries leave the stack unusable; `execute` then reports a
    /// sample or calculation error instead of panicking.
    pub fn initialise(
        &mut self,
        devices: &HashMap<String, SharedDevice>,
        pipelines: &HashMap<String, Arc<Pipeline>>,
    ) {
        self.device = devices.get(&self.config.device).cloned();
        if self.device.is_none() {
            tracing::error!("Sensing stack: device '{}' is not loaded", self.config.device);
        }

        self.pipeline = pipelines.get(&self.config.pipeline).cloned();
        if self.pipeline.is_none() {
            tracing::error!(
                "Sensing stack: pipeline '{}' is not defined",
                self.config.pipeline
            );
        }
    }

    /// Sample the device and run the result through the pipeline.
    ///
    /// Constants are merged over the pipeline output, then every key gets
    /// the prefix. A device failure is not retried here.
    pub async fn execute(&self) -> StackResult<Variables> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| StackError::sample(self.config.device.as_str(), "device not loaded"))?;

        let sample = {
            let mut guard = device.lock().await;
            guard.sample().await.map_err(|e| {
                tracing::error!("Sampling '{}' failed: {}", self.config.device, e);
                StackError::sample(self.config.device.as_str(), e.to_string())
            })?
        };
        tracing::debug!("sample from '{}': {:?}", self.config.device, sample);

        let pipeline = self.pipeline.as_ref().ok_or_else(|| {
            StackError::calculation(self.config.pipeline.as_str(), "pipeline not defined")
        })?;
        let mut output = pipeline.execute(sample)?;

        for (key, value) in &self.config.constants {
            output.insert(key.clone(), value.clone());
        }

        Ok(match &self.config.prefix {
            Some(prefix) => output
                .into_iter()
                .map(|(key, value)| (format!("{}{}", prefix, key), value))
                .collect(),
            None => output,
        })
    }
}
