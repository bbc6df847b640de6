//! Section types of a machine configuration document
//!
//! # Main Types
//!
//! - [`CapabilitySpec`] - `{module, class, config, variables}` for interfaces,
//!   devices and calculation units
//! - [`MeasurementConfig`] - scheduler choice plus its sensing stacks
//! - [`OutputChannel`] - one named output (`path` + transform `spec`)
//! - [`MqttConfig`] / [`ReconnectConfig`] - broker connection
//! - [`RuntimeSettings`] - supervisor tuning (cooldown, channel capacity)

use crate::types::Variables;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default cooldown after a failed tick, in seconds
pub const DEFAULT_ERROR_COOLDOWN_S: f64 = 30.0;

/// Default capacity of the supervisor -> wrapper channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

// ==================== Capabilities ====================

/// How to build one interface, device or calculation unit.
///
/// `config` is handed to the capability's factory as-is; `variables` maps
/// the roles a unit knows about (e.g. `raw_value`) to keys of the variable
/// mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub module: String,
    pub class: String,

    #[serde(default)]
    pub config: toml::Table,

    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Interface a device reads through (devices only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

impl CapabilitySpec {
    pub fn new(module: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            class: class.into(),
            ..Default::default()
        }
    }

    pub fn with_config(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    pub fn with_variable(mut self, role: &str, key: &str) -> Self {
        self.variables.insert(role.to_string(), key.to_string());
        self
    }

    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interface = Some(name.into());
        self
    }
}

// ==================== Measurement ====================

/// One device feeding one pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensingStackConfig {
    pub device: String,
    pub pipeline: String,

    /// Prepended to every output key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Merged over the pipeline output
    #[serde(default)]
    pub constants: Variables,
}

/// Timing parameters shared by all scheduler variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerParams {
    /// Seconds per emitted output (per round for multi-individual variants)
    #[serde(default = "default_period")]
    pub period: f64,

    /// Samples per averaging window; ignored by non-averaging variants
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,
}

fn default_period() -> f64 {
    1.0
}

fn default_n_samples() -> usize {
    1
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            period: default_period(),
            n_samples: default_n_samples(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    pub module: String,
    pub class: String,

    #[serde(default)]
    pub config: SchedulerParams,

    #[serde(default)]
    pub sensing_stacks: Vec<SensingStackConfig>,
}

// ==================== Output ====================

/// A named output channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputChannel {
    /// Topic fragment appended to the broker's base topic
    #[serde(default)]
    pub path: String,

    /// Nested mapping whose leaves are path references or literals
    pub spec: Value,

    /// Start from the full variable mapping instead of an empty payload
    #[serde(default)]
    pub append: bool,
}

// ==================== Broker ====================

/// Reconnect backoff, all in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial")]
    pub initial: f64,
    #[serde(default = "default_backoff")]
    pub backoff: f64,
    #[serde(default = "default_limit")]
    pub limit: f64,
}

fn default_initial() -> f64 {
    5.0
}

fn default_backoff() -> f64 {
    2.0
}

fn default_limit() -> f64 {
    60.0
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial: default_initial(),
            backoff: default_backoff(),
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub broker: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Mustache-style template, rendered against payload fields
    #[serde(default)]
    pub base_topic_template: String,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Defaults to `telemetryd-<machine name>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_s: u64,
}

fn default_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_keep_alive() -> u64 {
    30
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: DEFAULT_MQTT_PORT,
            base_topic_template: String::new(),
            reconnect: ReconnectConfig::default(),
            client_id: None,
            keep_alive_s: default_keep_alive(),
        }
    }
}

// ==================== Runtime ====================

/// Supervisor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Pause after a failed tick, in seconds
    #[serde(default = "default_cooldown")]
    pub error_cooldown_s: f64,

    /// Messages buffered between supervisor and wrapper
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
}

fn default_cooldown() -> f64 {
    DEFAULT_ERROR_COOLDOWN_S
}

fn default_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            error_cooldown_s: DEFAULT_ERROR_COOLDOWN_S,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
