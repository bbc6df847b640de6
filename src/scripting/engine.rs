//! Rhai Script Engine Implementation
//!
//! Builds the sandboxed [`Engine`] shared by script calculation units and
//! converts the variable mapping to and from Rhai values.
//!
//! ## Scope
//!
//! - `vars` - the variable mapping (object map), mutated in place
//! - `prev` - the mapping this unit returned last time (empty at first)
//! - `dt` - seconds since the previous execution (0.0 at first)
//!
//! ## Helper Functions
//!
//! - `num(x)` - `x` as a float, NaN when it is not a number (e.g. a missing key)
//! - `smooth(current, previous, alpha)` - exponential smoothing (EWMA)
//! - `lowpass(current, previous, cutoff_hz, dt)` - first-order lowpass filter
//! - `derivative(current, previous, dt)` - rate of change
//! - `deadband(value, center, width)` - snap to center inside the band
//! - `clamp_range(value, min, max)` - clamp into `[min, max]`
//! - `rms_to_peak(rms)` / `peak_to_rms(peak)` - sine-wave conversions

use rhai::{Array, Dynamic, Engine, Map, Scope, AST};
use serde_json::{Number, Value};

use crate::types::Variables;

/// Default operation budget per execution
pub const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

/// Create an engine with safety limits and the helper functions registered
pub fn build_engine(max_operations: u64) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(64, 64);
    engine.set_max_call_levels(32);
    engine.set_max_operations(max_operations);
    engine.set_max_string_size(10_000);
    engine.set_max_array_size(1_000);
    engine.set_max_map_size(1_000);

    // ===== Value Access =====

    engine.register_fn("num", |x: Dynamic| -> f64 {
        if let Ok(f) = x.as_float() {
            f
        } else if let Ok(i) = x.as_int() {
            i as f64
        } else {
            f64::NAN
        }
    });

    // ===== Filters =====

    engine.register_fn("smooth", |current: f64, previous: f64, alpha: f64| -> f64 {
        let alpha = alpha.clamp(0.0, 1.0);
        if !previous.is_nan() {
            alpha * previous + (1.0 - alpha) * current
        } else {
            current
        }
    });

    engine.register_fn(
        "lowpass",
        |current: f64, previous: f64, cutoff_hz: f64, dt: f64| -> f64 {
            if !previous.is_nan() && dt > 0.0 && cutoff_hz > 0.0 {
                let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
                let alpha = dt / (rc + dt);
                previous + alpha * (current - previous)
            } else {
                current
            }
        },
    );

    engine.register_fn(
        "derivative",
        |current: f64, previous: f64, dt: f64| -> f64 {
            if dt > 0.0 && !previous.is_nan() {
                (current - previous) / dt
            } else {
                0.0
            }
        },
    );

    engine.register_fn("deadband", |value: f64, center: f64, width: f64| -> f64 {
        if (value - center).abs() < width / 2.0 {
            center
        } else {
            value
        }
    });

    engine.register_fn("clamp_range", |value: f64, min: f64, max: f64| -> f64 {
        if min > max {
            value
        } else {
            value.clamp(min, max)
        }
    });

    // ===== Electrical =====

    engine.register_fn("rms_to_peak", |rms: f64| rms * std::f64::consts::SQRT_2);
    engine.register_fn("peak_to_rms", |peak: f64| {
        peak * std::f64::consts::FRAC_1_SQRT_2
    });

    // ===== Math =====

    engine.register_fn("abs", |x: f64| x.abs());
    engine.register_fn("sqrt", |x: f64| x.sqrt());
    engine.register_fn("pow", |x: f64, y: f64| x.powf(y));
    engine.register_fn("ln", |x: f64| x.ln());
    engine.register_fn("log10", |x: f64| x.log10());
    engine.register_fn("is_nan", |x: f64| x.is_nan());
    engine.register_fn("to_float", |x: i64| x as f64);

    engine
}

/// Compile a script, reporting syntax errors as text
pub fn compile(engine: &Engine, source: &str) -> Result<AST, String> {
    engine
        .compile(source)
        .map_err(|e| format!("Compilation error: {}", e))
}

/// Run `ast` with `vars`, `prev` and `dt` in scope; returns the updated `vars`
pub fn run(
    engine: &Engine,
    ast: &AST,
    vars: Variables,
    prev: &Variables,
    dt: f64,
) -> Result<Variables, String> {
    let mut scope = Scope::new();
    scope.push("vars", map_to_rhai(vars));
    scope.push("prev", map_to_rhai(prev.clone()));
    scope.push_constant("dt", dt);

    engine
        .run_ast_with_scope(&mut scope, ast)
        .map_err(|e| format!("Runtime error: {}", e))?;

    let out = scope
        .get_value::<Map>("vars")
        .ok_or_else(|| "script replaced 'vars' with a non-map value".to_string())?;
    Ok(map_from_rhai(out))
}

// ==================== Conversions ====================

fn map_to_rhai(vars: Variables) -> Map {
    vars.into_iter()
        .map(|(k, v)| (k.into(), value_to_dynamic(v)))
        .collect()
}

fn map_from_rhai(map: Map) -> Variables {
    map.into_iter()
        .map(|(k, v)| (k.to_string(), dynamic_to_value(v)))
        .collect()
}

pub fn value_to_dynamic(value: Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from(i),
            None => Dynamic::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Dynamic::from(s),
        Value::Array(items) => {
            let array: Array = items.into_iter().map(value_to_dynamic).collect();
            Dynamic::from(array)
        }
        Value::Object(map) => Dynamic::from(map_to_rhai(map)),
    }
}

pub fn dynamic_to_value(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::Number(i.into());
    }
    if let Ok(f) = value.as_float() {
        return Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null);
    }
    if value.is_string() {
        return Value::String(value.into_string().unwrap_or_default());
    }
    if value.is::<Array>() {
        let array = value.cast::<Array>();
        return Value::Array(array.into_iter().map(dynamic_to_value).collect());
    }
    if value.is::<Map>() {
        return Value::Object(map_from_rhai(value.cast::<Map>()));
    }
    Value::String(value.to_string())
}
