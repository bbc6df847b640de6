//! Sanity checks on a loaded machine config
//!
//! Validation never touches the registry: unknown module/class names are
//! reported when the supervisor loads them. This catches the structural
//! mistakes (dangling names, impossible timing, broker typos) up front.

use super::DaemonConfig;
use crate::delivery::topic::check_template;
use std::net::IpAddr;

/// Ports brokers usually listen on (plain and TLS)
const TYPICAL_PORTS: [u16; 2] = [1883, 8883];

/// Outcome of [`validate`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Emit every finding through `tracing`
    pub fn log(&self, machine: &str) {
        for w in &self.warnings {
            tracing::warn!("[{}] config: {}", machine, w);
        }
        for e in &self.errors {
            tracing::error!("[{}] config: {}", machine, e);
        }
        if self.is_valid() {
            tracing::info!("[{}] config: VALID", machine);
        }
    }
}

/// Check a machine config for structural problems
pub fn validate(config: &DaemonConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_mqtt(config, &mut report);
    validate_measurement(config, &mut report);
    validate_wiring(config, &mut report);
    validate_output(config, &mut report);
    report
}

fn looks_like_hostname(host: &str) -> bool {
    !host.is_empty()
        && host
            .split('.')
            .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

fn validate_mqtt(config: &DaemonConfig, report: &mut ValidationReport) {
    let Some(mqtt) = &config.mqtt else {
        report.error("[mqtt] section not found");
        return;
    };

    if mqtt.broker.is_empty() {
        report.error("mqtt.broker not specified");
    } else if mqtt.broker.parse::<IpAddr>().is_err() {
        if looks_like_hostname(&mqtt.broker) {
            report.warn(format!(
                "mqtt.broker '{}' is not an IP address; check it resolves",
                mqtt.broker
            ));
        } else {
            report.error(format!(
                "mqtt.broker '{}' is neither an IP address nor a host name",
                mqtt.broker
            ));
        }
    }

    if mqtt.port == 0 {
        report.error("mqtt.port must be non-zero");
    } else if !TYPICAL_PORTS.contains(&mqtt.port) {
        report.warn(format!(
            "mqtt.port {} is unusual; 1883 and 8883 are typical",
            mqtt.port
        ));
    }

    if mqtt.base_topic_template.trim_matches('/').is_empty() {
        report.warn("mqtt.base_topic_template is empty; messages publish under their path only");
    } else if let Err(e) = check_template(&mqtt.base_topic_template) {
        report.error(format!("mqtt.base_topic_template does not compile: {}", e));
    }

    let r = &mqtt.reconnect;
    if r.initial <= 0.0 {
        report.error("mqtt.reconnect.initial must be positive");
    }
    if r.backoff < 1.0 {
        report.error("mqtt.reconnect.backoff must be at least 1");
    }
    if r.limit < r.initial {
        report.error("mqtt.reconnect.limit must not be below initial");
    }
}

fn validate_measurement(config: &DaemonConfig, report: &mut ValidationReport) {
    let Some(measurement) = &config.measurement else {
        report.error("[measurement] section not found");
        return;
    };

    if measurement.config.period <= 0.0 || !measurement.config.period.is_finite() {
        report.error("measurement.config.period must be a positive number of seconds");
    }
    if measurement.config.n_samples == 0 {
        report.error("measurement.config.n_samples must be at least 1");
    }

    let stacks = &measurement.sensing_stacks;
    if stacks.is_empty() {
        report.error("measurement has no sensing_stacks");
    }
    if measurement.class.starts_with("Single") && stacks.len() > 1 {
        report.warn(format!(
            "{} drives one sensing stack; {} extra will be ignored",
            measurement.class,
            stacks.len() - 1
        ));
    }

    for (i, stack) in stacks.iter().enumerate() {
        if !config.pipelines.contains_key(&stack.pipeline) {
            report.error(format!(
                "sensing stack {} uses undefined pipeline '{}'",
                i, stack.pipeline
            ));
        }
        if !config.device.contains_key(&stack.device) {
            report.error(format!(
                "sensing stack {} uses undefined device '{}'",
                i, stack.device
            ));
        }
    }
}

fn validate_wiring(config: &DaemonConfig, report: &mut ValidationReport) {
    for (name, device) in &config.device {
        if let Some(interface) = &device.interface {
            if !config.interface.contains_key(interface) {
                report.error(format!(
                    "device '{}' uses undefined interface '{}'",
                    name, interface
                ));
            }
        }
    }

    for (name, units) in &config.pipelines {
        for unit in units {
            if !config.calculation.contains_key(unit) {
                report.error(format!(
                    "pipeline '{}' uses undefined calculation '{}'",
                    name, unit
                ));
            }
        }
    }
}

fn validate_output(config: &DaemonConfig, report: &mut ValidationReport) {
    for (name, channel) in &config.output {
        if !channel.spec.is_object() {
            report.error(format!("output '{}': spec must be a table", name));
        } else if let Err(e) = crate::output::check_spec(&channel.spec) {
            report.error(format!("output '{}': {}", name, e));
        }
    }
}
