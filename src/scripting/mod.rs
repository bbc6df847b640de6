//! Rhai Scripting for Calculation Units
//!
//! The `script.Rhai` calculation unit runs a user-supplied Rhai script
//! against the variable mapping, for conversions no built-in unit covers.
//!
//! ## Config
//!
//! ```toml
//! [calculation.spindle_power]
//! module = "script"
//! class = "Rhai"
//! config = { script = "vars.power = vars.i_rms * vars.v_rms * 3.0;" }
//! ```
//!
//! `script` holds the source inline; `file` points at a `.rhai` file
//! instead. `max_operations` bounds the work per execution.
//!
//! ## Example Scripts
//!
//! Smoothing a noisy reading:
//! ```rhai
//! vars.temp = smooth(num(vars.temp), num(prev.temp), 0.8);
//! ```
//!
//! Rate of change in units per second:
//! ```rhai
//! vars.flow_rate = derivative(num(vars.volume), num(prev.volume), dt);
//! ```
//!
//! Flagging a limit:
//! ```rhai
//! vars.overload = num(vars.current) > 16.0;
//! ```
//!
//! Compile errors are reported when the unit is built; runtime errors
//! (including `throw`) fail the calculation for that execution.

mod engine;

pub use engine::{
    build_engine, compile, dynamic_to_value, run, value_to_dynamic, DEFAULT_MAX_OPERATIONS,
};

use crate::capability::{config_str, Calculation};
use crate::config::CapabilitySpec;
use crate::error::{CapabilityError, RegistryError};
use crate::types::Variables;
use rhai::{Engine, AST};
use std::sync::Mutex;
use std::time::Instant;

/// What a script unit remembers between executions
#[derive(Default)]
struct ScriptState {
    prev: Variables,
    last_run: Option<Instant>,
}

/// Calculation unit backed by a compiled Rhai script
pub struct ScriptCalculation {
    name: String,
    engine: Engine,
    ast: AST,
    state: Mutex<ScriptState>,
}

impl ScriptCalculation {
    /// Compile `source` into a unit
    pub fn new(name: impl Into<String>, source: &str, max_operations: u64) -> Result<Self, String> {
        let engine = build_engine(max_operations);
        let ast = compile(&engine, source)?;
        Ok(Self {
            name: name.into(),
            engine,
            ast,
            state: Mutex::new(ScriptState::default()),
        })
    }

    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        let invalid = |message: String| RegistryError::InvalidConfig {
            module: spec.module.clone(),
            class: spec.class.clone(),
            message,
        };

        let source = match (config_str(spec, "script")?, config_str(spec, "file")?) {
            (Some(inline), _) => inline,
            (None, Some(path)) => std::fs::read_to_string(&path)
                .map_err(|e| invalid(format!("cannot read script '{}': {}", path, e)))?,
            (None, None) => return Err(invalid("needs 'script' or 'file'".to_string())),
        };

        let max_operations = match spec.config.get("max_operations") {
            Some(toml::Value::Integer(n)) if *n > 0 => *n as u64,
            Some(_) => return Err(invalid("'max_operations' must be a positive integer".into())),
            None => DEFAULT_MAX_OPERATIONS,
        };

        Self::new(format!("{}.{}", spec.module, spec.class), &source, max_operations)
            .map_err(invalid)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Calculation for ScriptCalculation {
    fn calculate(&self, vars: Variables) -> Result<Variables, CapabilityError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CapabilityError::new("script state poisoned"))?;

        let now = Instant::now();
        let dt = state
            .last_run
            .map(|t| now.duration_since(t).as_secs_f64())
            .unwrap_or(0.0);

        let out = run(&self.engine, &self.ast, vars, &state.prev, dt).map_err(CapabilityError)?;
        state.prev = out.clone();
        state.last_run = Some(now);
        Ok(out)
    }
}
