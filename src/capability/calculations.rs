//! Built-in calculation units
//!
//! Units are written from the measured quantity back towards the sensor:
//! a pipeline lists them output-first and runs them in reverse, so each
//! unit reads the variable nearer the device and writes the one nearer the
//! physical quantity.
//!
//! A missing (or null) input logs a warning and leaves the mapping as it
//! was. A non-numeric input is a unit failure.

use super::{config_f64, config_value, require_f64, variable, variable_or, Calculation};
use crate::config::CapabilitySpec;
use crate::error::{CapabilityError, RegistryError};
use crate::types::{f64_value, Variables};
use serde_json::Value;

const ONE_OVER_SQRT_2: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Fallback phase voltage when none is configured
const DEFAULT_PHASE_VOLTAGE: f64 = 230.0;

/// Numeric input, `None` (with a warning) when absent or null
fn read_number(vars: &Variables, key: &str, unit: &str) -> Result<Option<f64>, CapabilityError> {
    match vars.get(key) {
        None | Some(Value::Null) => {
            tracing::warn!("{}: variable '{}' not found", unit, key);
            Ok(None)
        }
        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
            CapabilityError::new(format!("variable '{}' is not numeric: {}", key, value))
        }),
    }
}

// ==================== Scaling ====================

/// `calibrated = raw * multiplier + offset`
pub struct MultiplierOffset {
    multiplier: f64,
    offset: f64,
    raw_value: String,
    calibrated_value: String,
}

impl MultiplierOffset {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        let raw_value = variable(spec, "raw_value")?;
        Ok(Self {
            multiplier: config_f64(spec, "multiplier")?.unwrap_or(1.0),
            offset: config_f64(spec, "offset")?.unwrap_or(0.0),
            calibrated_value: variable_or(spec, "calibrated_value", &raw_value),
            raw_value,
        })
    }
}

impl Calculation for MultiplierOffset {
    fn calculate(&self, mut vars: Variables) -> Result<Variables, CapabilityError> {
        if let Some(raw) = read_number(&vars, &self.raw_value, "MultiplierOffset")? {
            vars.insert(
                self.calibrated_value.clone(),
                f64_value(raw * self.multiplier + self.offset),
            );
        }
        Ok(vars)
    }
}

/// Undo an amplifier stage: `input = output / gain`
pub struct Amplifier {
    gain: f64,
    amp_input: String,
    amp_output: String,
}

impl Amplifier {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        let gain = require_f64(spec, "gain")?;
        if gain == 0.0 {
            return Err(RegistryError::InvalidConfig {
                module: spec.module.clone(),
                class: spec.class.clone(),
                message: "gain must be non-zero".to_string(),
            });
        }
        let amp_input = variable(spec, "amp_input")?;
        Ok(Self {
            gain,
            amp_output: variable_or(spec, "amp_output", &amp_input),
            amp_input,
        })
    }
}

impl Calculation for Amplifier {
    fn calculate(&self, mut vars: Variables) -> Result<Variables, CapabilityError> {
        if let Some(out) = read_number(&vars, &self.amp_output, "Amplifier")? {
            vars.insert(self.amp_input.clone(), f64_value(out / self.gain));
        }
        Ok(vars)
    }
}

/// Voltage-output current clamp: `current = v / nominal_voltage * nominal_current`
pub struct VoltageClamp {
    nominal_voltage: f64,
    nominal_current: f64,
    voltage_out: String,
    current_in: String,
}

impl VoltageClamp {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        let nominal_voltage = config_f64(spec, "nominal_voltage")?.unwrap_or(1.0);
        if nominal_voltage == 0.0 {
            return Err(RegistryError::InvalidConfig {
                module: spec.module.clone(),
                class: spec.class.clone(),
                message: "nominal_voltage must be non-zero".to_string(),
            });
        }
        Ok(Self {
            nominal_voltage,
            nominal_current: require_f64(spec, "nominal_current")?,
            voltage_out: variable(spec, "voltage_out")?,
            current_in: variable_or(spec, "current_in", "current"),
        })
    }
}

impl Calculation for VoltageClamp {
    fn calculate(&self, mut vars: Variables) -> Result<Variables, CapabilityError> {
        if let Some(v) = read_number(&vars, &self.voltage_out, "VoltageClamp")? {
            let current = v / self.nominal_voltage * self.nominal_current;
            vars.insert(self.current_in.clone(), f64_value(current));
        }
        Ok(vars)
    }
}

// ==================== Electrical ====================

/// Peak to RMS: `var_in = var_out / sqrt(2)`
pub struct RmsToPeak {
    var_in: String,
    var_out: String,
}

impl RmsToPeak {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        Ok(Self {
            var_in: variable(spec, "var_in")?,
            var_out: variable(spec, "var_out")?,
        })
    }
}

impl Calculation for RmsToPeak {
    fn calculate(&self, mut vars: Variables) -> Result<Variables, CapabilityError> {
        if let Some(peak) = read_number(&vars, &self.var_out, "RmsToPeak")? {
            vars.insert(self.var_in.clone(), f64_value(peak * ONE_OVER_SQRT_2));
        }
        Ok(vars)
    }
}

/// Apparent power from line current at a fixed phase voltage:
/// `power = phases * I_line * V_phase`
pub struct PowerToCurrent {
    phases: f64,
    phase_voltage: f64,
    power_in: String,
    rms_current_out: String,
}

impl PowerToCurrent {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        let phase_voltage = match (
            config_f64(spec, "phase_voltage")?,
            config_f64(spec, "line_voltage")?,
        ) {
            (Some(phase), _) => phase,
            (None, Some(line)) => line / 3f64.sqrt(),
            (None, None) => {
                tracing::warn!(
                    "PowerToCurrent: phase voltage not specified, using {}V",
                    DEFAULT_PHASE_VOLTAGE
                );
                DEFAULT_PHASE_VOLTAGE
            }
        };
        Ok(Self {
            phases: config_f64(spec, "phases")?.unwrap_or(1.0),
            phase_voltage,
            power_in: variable(spec, "power_in")?,
            rms_current_out: variable(spec, "rms_current_out")?,
        })
    }
}

impl Calculation for PowerToCurrent {
    fn calculate(&self, mut vars: Variables) -> Result<Variables, CapabilityError> {
        if let Some(current) = read_number(&vars, &self.rms_current_out, "PowerToCurrent")? {
            let power = self.phases * current * self.phase_voltage;
            vars.insert(self.power_in.clone(), f64_value(power));
        }
        Ok(vars)
    }
}

/// Apparent power from measured current and voltage:
/// `power = phases * I_line * V_phase`
pub struct PowerToVoltageCurrent {
    phases: f64,
    power_in: String,
    rms_current_out: String,
    rms_phase_voltage_out: String,
}

impl PowerToVoltageCurrent {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        Ok(Self {
            phases: config_f64(spec, "phases")?.unwrap_or(1.0),
            power_in: variable(spec, "power_in")?,
            rms_current_out: variable(spec, "rms_current_out")?,
            rms_phase_voltage_out: variable(spec, "rms_phase_voltage_out")?,
        })
    }
}

impl Calculation for PowerToVoltageCurrent {
    fn calculate(&self, mut vars: Variables) -> Result<Variables, CapabilityError> {
        let unit = "PowerToVoltageCurrent";
        let current = read_number(&vars, &self.rms_current_out, unit)?;
        let voltage = read_number(&vars, &self.rms_phase_voltage_out, unit)?;
        if let (Some(i), Some(v)) = (current, voltage) {
            vars.insert(self.power_in.clone(), f64_value(self.phases * i * v));
        }
        Ok(vars)
    }
}

// ==================== Constants ====================

/// Set `variable` to `value` only if it is absent
pub struct DefaultConstant {
    variable: String,
    value: Value,
}

impl DefaultConstant {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        Ok(Self {
            variable: variable(spec, "variable")?,
            value: config_value(spec, "value")?,
        })
    }
}

impl Calculation for DefaultConstant {
    fn calculate(&self, mut vars: Variables) -> Result<Variables, CapabilityError> {
        vars.entry(self.variable.clone())
            .or_insert_with(|| self.value.clone());
        Ok(vars)
    }
}

/// Set `new_variable` to `value` whenever `original_variable` is present
pub struct RenameDefaultConstant {
    original: String,
    new: String,
    value: Value,
}

impl RenameDefaultConstant {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        Ok(Self {
            original: variable(spec, "original_variable")?,
            new: variable(spec, "new_variable")?,
            value: config_value(spec, "value")?,
        })
    }
}

impl Calculation for RenameDefaultConstant {
    fn calculate(&self, mut vars: Variables) -> Result<Variables, CapabilityError> {
        if vars.contains_key(&self.original) {
            vars.insert(self.new.clone(), self.value.clone());
        }
        Ok(vars)
    }
}

/// Always overwrite `variable` with `value`
pub struct FixedConstant {
    variable: String,
    value: Value,
}

impl FixedConstant {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        Ok(Self {
            variable: variable(spec, "variable")?,
            value: config_value(spec, "value")?,
        })
    }
}

impl Calculation for FixedConstant {
    fn calculate(&self, mut vars: Variables) -> Result<Variables, CapabilityError> {
        vars.insert(self.variable.clone(), self.value.clone());
        Ok(vars)
    }
}
