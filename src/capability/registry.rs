//! Typed `(module, class)` → factory lookup
//!
//! The registry is a pure factory: resolving a spec builds a new instance
//! and never touches hardware. Initialization happens later, in the
//! supervisor.

use super::calculations::*;
use super::devices::{Ds18b20, JsonLine, MockConstant, MockRandom};
use super::interfaces::{NullInterface, TextFile};
use super::{Device, SharedCalculation, SharedInterface};
use crate::config::{CapabilitySpec, MeasurementConfig};
use crate::error::RegistryError;
use crate::measurement::{self, Measurement};
use crate::scripting::ScriptCalculation;
use std::collections::HashMap;
use std::sync::Arc;

type Key = (String, String);

pub type InterfaceFactory =
    Box<dyn Fn(&CapabilitySpec) -> Result<SharedInterface, RegistryError> + Send + Sync>;
pub type DeviceFactory =
    Box<dyn Fn(&CapabilitySpec) -> Result<Box<dyn Device>, RegistryError> + Send + Sync>;
pub type CalculationFactory =
    Box<dyn Fn(&CapabilitySpec) -> Result<SharedCalculation, RegistryError> + Send + Sync>;
pub type MeasurementFactory =
    Box<dyn Fn(&MeasurementConfig) -> Result<Box<dyn Measurement>, RegistryError> + Send + Sync>;

/// Factories for every capability kind, keyed by `(module, class)`
#[derive(Default)]
pub struct Registry {
    interfaces: HashMap<Key, InterfaceFactory>,
    devices: HashMap<Key, DeviceFactory>,
    calculations: HashMap<Key, CalculationFactory>,
    measurements: HashMap<Key, MeasurementFactory>,
}

fn key(module: &str, class: &str) -> Key {
    (module.to_string(), class.to_string())
}

fn lookup<'a, F>(
    table: &'a HashMap<Key, F>,
    kind: &'static str,
    module: &str,
    class: &str,
) -> Result<&'a F, RegistryError> {
    if let Some(factory) = table.get(&key(module, class)) {
        return Ok(factory);
    }
    if table.keys().any(|(m, _)| m == module) {
        Err(RegistryError::UnknownClass {
            kind,
            module: module.to_string(),
            class: class.to_string(),
        })
    } else {
        Err(RegistryError::UnknownModule {
            kind,
            module: module.to_string(),
        })
    }
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in capability registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // Interfaces
        registry.register_interface("none", "Null", |_| Ok(Arc::new(NullInterface)));
        registry.register_interface("file", "TextFile", |spec| {
            Ok(Arc::new(TextFile::from_spec(spec)?))
        });

        // Devices
        registry.register_device("testing", "MockConstant", |spec| {
            Ok(Box::new(MockConstant::from_spec(spec)?))
        });
        registry.register_device("testing", "MockRandom", |spec| {
            Ok(Box::new(MockRandom::from_spec(spec)?))
        });
        registry.register_device("one_wire", "Ds18b20", |spec| {
            Ok(Box::new(Ds18b20::from_spec(spec)?))
        });
        registry.register_device("text", "JsonLine", |spec| {
            Ok(Box::new(JsonLine::from_spec(spec)?))
        });

        // Calculation units
        registry.register_calculation("calibrate", "MultiplierOffset", |spec| {
            Ok(Arc::new(MultiplierOffset::from_spec(spec)?))
        });
        registry.register_calculation("amplifier", "Amplifier", |spec| {
            Ok(Arc::new(Amplifier::from_spec(spec)?))
        });
        registry.register_calculation("current_clamp", "VoltageClamp", |spec| {
            Ok(Arc::new(VoltageClamp::from_spec(spec)?))
        });
        registry.register_calculation("electrical", "RmsToPeak", |spec| {
            Ok(Arc::new(RmsToPeak::from_spec(spec)?))
        });
        registry.register_calculation("electrical", "PowerToCurrent", |spec| {
            Ok(Arc::new(PowerToCurrent::from_spec(spec)?))
        });
        registry.register_calculation("electrical", "PowerToVoltageCurrent", |spec| {
            Ok(Arc::new(PowerToVoltageCurrent::from_spec(spec)?))
        });
        registry.register_calculation("constants", "DefaultConstant", |spec| {
            Ok(Arc::new(DefaultConstant::from_spec(spec)?))
        });
        registry.register_calculation("constants", "RenameDefaultConstant", |spec| {
            Ok(Arc::new(RenameDefaultConstant::from_spec(spec)?))
        });
        registry.register_calculation("constants", "FixedConstant", |spec| {
            Ok(Arc::new(FixedConstant::from_spec(spec)?))
        });
        registry.register_calculation("script", "Rhai", |spec| {
            Ok(Arc::new(ScriptCalculation::from_spec(spec)?))
        });

        // Schedulers
        for class in measurement::CLASSES {
            registry.register_measurement(measurement::MODULE, class, measurement::build);
        }

        registry
    }

    pub fn register_interface<F>(&mut self, module: &str, class: &str, factory: F)
    where
        F: Fn(&CapabilitySpec) -> Result<SharedInterface, RegistryError> + Send + Sync + 'static,
    {
        self.interfaces.insert(key(module, class), Box::new(factory));
    }

    pub fn register_device<F>(&mut self, module: &str, class: &str, factory: F)
    where
        F: Fn(&CapabilitySpec) -> Result<Box<dyn Device>, RegistryError> + Send + Sync + 'static,
    {
        self.devices.insert(key(module, class), Box::new(factory));
    }

    pub fn register_calculation<F>(&mut self, module: &str, class: &str, factory: F)
    where
        F: Fn(&CapabilitySpec) -> Result<SharedCalculation, RegistryError> + Send + Sync + 'static,
    {
        self.calculations.insert(key(module, class), Box::new(factory));
    }

    pub fn register_measurement<F>(&mut self, module: &str, class: &str, factory: F)
    where
        F: Fn(&MeasurementConfig) -> Result<Box<dyn Measurement>, RegistryError>
            + Send
            + Sync
            + 'static,
    {
        self.measurements.insert(key(module, class), Box::new(factory));
    }

    pub fn resolve_interface(&self, spec: &CapabilitySpec) -> Result<SharedInterface, RegistryError> {
        let factory = lookup(&self.interfaces, "interface", &spec.module, &spec.class)?;
        factory(spec)
    }

    pub fn resolve_device(&self, spec: &CapabilitySpec) -> Result<Box<dyn Device>, RegistryError> {
        let factory = lookup(&self.devices, "device", &spec.module, &spec.class)?;
        factory(spec)
    }

    pub fn resolve_calculation(
        &self,
        spec: &CapabilitySpec,
    ) -> Result<SharedCalculation, RegistryError> {
        let factory = lookup(&self.calculations, "calculation", &spec.module, &spec.class)?;
        factory(spec)
    }

    pub fn resolve_measurement(
        &self,
        config: &MeasurementConfig,
    ) -> Result<Box<dyn Measurement>, RegistryError> {
        let factory = lookup(&self.measurements, "measurement", &config.module, &config.class)?;
        factory(config)
    }
}
