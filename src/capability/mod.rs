//! Pluggable capabilities: interfaces, devices and calculation units
//!
//! Every hardware- or math-specific piece of a machine's setup is a
//! capability chosen by `(module, class)` in the config and built by the
//! [`Registry`]. The rest of the daemon only talks to these traits.
//!
//! - [`Interface`] - a bus or transport (file, serial, I2C...) that devices
//!   read through. Shared between devices, so methods take `&self`.
//! - [`Device`] - produces a raw [`Variables`] sample. May suspend.
//! - [`Calculation`] - a pure transformation of the variable mapping.

pub mod calculations;
pub mod devices;
pub mod interfaces;
pub mod registry;

pub use registry::Registry;

use crate::config::CapabilitySpec;
use crate::error::{CapabilityError, RegistryError};
use crate::types::Variables;
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// A bus or transport a device reads through
#[async_trait]
pub trait Interface: Send + Sync {
    /// Open the underlying resource. Called once before any device uses it.
    async fn initialise(&self) -> Result<(), CapabilityError>;

    /// Concrete access for devices that expect a particular interface type
    fn as_any(&self) -> &dyn Any;
}

/// A sensor or meter producing raw samples
#[async_trait]
pub trait Device: Send {
    /// Bind to the interface named in the device's config (if any)
    async fn initialise(
        &mut self,
        interface: Option<SharedInterface>,
    ) -> Result<(), CapabilityError>;

    /// Take one reading
    async fn sample(&mut self) -> Result<Variables, CapabilityError>;
}

/// A unit conversion, calibration or derived quantity.
///
/// Receives the mapping by value and returns it. Keys the unit does not
/// write must come back untouched.
#[cfg_attr(test, mockall::automock)]
pub trait Calculation: Send + Sync {
    fn calculate(&self, vars: Variables) -> Result<Variables, CapabilityError>;
}

pub type SharedInterface = Arc<dyn Interface>;
pub type SharedDevice = Arc<tokio::sync::Mutex<Box<dyn Device>>>;
pub type SharedCalculation = Arc<dyn Calculation>;

/// Wrap a device for sharing between sensing stacks
pub fn share_device(device: Box<dyn Device>) -> SharedDevice {
    Arc::new(tokio::sync::Mutex::new(device))
}

// ==================== Spec helpers ====================

fn invalid(spec: &CapabilitySpec, message: impl Into<String>) -> RegistryError {
    RegistryError::InvalidConfig {
        module: spec.module.clone(),
        class: spec.class.clone(),
        message: message.into(),
    }
}

/// Numeric config entry (integers are widened)
pub(crate) fn config_f64(spec: &CapabilitySpec, key: &str) -> Result<Option<f64>, RegistryError> {
    match spec.config.get(key) {
        None => Ok(None),
        Some(toml::Value::Float(f)) => Ok(Some(*f)),
        Some(toml::Value::Integer(i)) => Ok(Some(*i as f64)),
        Some(other) => Err(invalid(
            spec,
            format!("'{}' must be a number, got {}", key, other.type_str()),
        )),
    }
}

pub(crate) fn require_f64(spec: &CapabilitySpec, key: &str) -> Result<f64, RegistryError> {
    config_f64(spec, key)?.ok_or_else(|| invalid(spec, format!("missing config '{}'", key)))
}

pub(crate) fn config_str(spec: &CapabilitySpec, key: &str) -> Result<Option<String>, RegistryError> {
    match spec.config.get(key) {
        None => Ok(None),
        Some(toml::Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(
            spec,
            format!("'{}' must be a string, got {}", key, other.type_str()),
        )),
    }
}

/// Config entry converted to a JSON value (for constants)
pub(crate) fn config_value(spec: &CapabilitySpec, key: &str) -> Result<Value, RegistryError> {
    match spec.config.get(key) {
        None => Ok(Value::Null),
        Some(v) => serde_json::to_value(v).map_err(|e| invalid(spec, e.to_string())),
    }
}

/// Name of the mapping key a unit uses for `role`
pub(crate) fn variable(spec: &CapabilitySpec, role: &str) -> Result<String, RegistryError> {
    spec.variables
        .get(role)
        .cloned()
        .ok_or_else(|| invalid(spec, format!("missing variable '{}'", role)))
}

pub(crate) fn variable_or(spec: &CapabilitySpec, role: &str, default: &str) -> String {
    spec.variables
        .get(role)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}
