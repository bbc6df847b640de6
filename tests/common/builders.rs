//! Test data builders for creating machine configs

use telemetryd::config::{
    CapabilitySpec, DaemonConfig, MeasurementConfig, MqttConfig, OutputChannel, SchedulerParams,
    SensingStackConfig,
};

/// Builder for a single-machine [`DaemonConfig`]
pub struct ConfigBuilder {
    config: DaemonConfig,
}

impl ConfigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            config: DaemonConfig {
                name: name.to_string(),
                mqtt: Some(MqttConfig {
                    broker: "localhost".into(),
                    base_topic_template: format!("plant/{}", name),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }

    pub fn device(mut self, name: &str, spec: CapabilitySpec) -> Self {
        self.config.device.insert(name.to_string(), spec);
        self
    }

    pub fn calculation(mut self, name: &str, spec: CapabilitySpec) -> Self {
        self.config.calculation.insert(name.to_string(), spec);
        self
    }

    pub fn pipeline(mut self, name: &str, units: &[&str]) -> Self {
        self.config
            .pipelines
            .insert(name.to_string(), units.iter().map(|u| u.to_string()).collect());
        self
    }

    /// Scheduler driving one stack per `(device, pipeline)` pair
    pub fn measurement(mut self, class: &str, period: f64, n_samples: usize, stacks: &[(&str, &str)]) -> Self {
        self.config.measurement = Some(MeasurementConfig {
            module: "sample".into(),
            class: class.into(),
            config: SchedulerParams { period, n_samples },
            sensing_stacks: stacks
                .iter()
                .map(|(device, pipeline)| SensingStackConfig {
                    device: device.to_string(),
                    pipeline: pipeline.to_string(),
                    ..Default::default()
                })
                .collect(),
        });
        self
    }

    pub fn output(mut self, name: &str, path: &str, spec: serde_json::Value, append: bool) -> Self {
        self.config.output.insert(
            name.to_string(),
            OutputChannel {
                path: path.to_string(),
                spec,
                append,
            },
        );
        self
    }

    pub fn cooldown(mut self, seconds: f64) -> Self {
        self.config.runtime.error_cooldown_s = seconds;
        self
    }

    pub fn build(self) -> DaemonConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new("press")
            .device("meter", CapabilitySpec::new("testing", "MockConstant"))
            .pipeline("raw", &[])
            .measurement("Single", 1.0, 1, &[("meter", "raw")])
            .build();

        assert_eq!(config.name, "press");
        assert!(config.device.contains_key("meter"));
        assert_eq!(config.measurement.unwrap().sensing_stacks.len(), 1);
    }
}
