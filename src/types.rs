//! Core data types for telemetryd
//!
//! # Main Types
//!
//! - [`Variables`] - The flat variable mapping threaded from devices through
//!   pipelines into the output transformer
//! - [`Message`] - A finished payload plus its topic fragment, the unit carried
//!   from the acquisition side to the delivery side
//! - [`ErrorKind`] / [`ErrorReport`] - The body of an error message published
//!   when a device or calculation unit fails
//!
//! # Timestamps
//!
//! Payloads carry an ISO-8601 `timestamp` with the machine's local UTC
//! offset, e.g. `2024-03-01T12:00:00.123456+01:00`. [`local_timestamp`]
//! produces that format.

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which every payload carries its capture time
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Variable mapping: unique string keys to number, string, bool or null
pub type Variables = serde_json::Map<String, Value>;

/// Current local time as ISO-8601 with UTC offset
pub fn local_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// True when the value takes part in arithmetic averaging
pub fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Number(_))
}

/// Read a variable as `f64`, `None` if absent, null or not a number
pub fn get_f64(vars: &Variables, key: &str) -> Option<f64> {
    vars.get(key).and_then(Value::as_f64)
}

/// Convert an `f64` into a JSON number, mapping NaN/inf to null
pub fn f64_value(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// A payload ready for delivery.
///
/// Wire shape: `{"path": string, "payload": object}`. `path` is a topic
/// fragment appended to the broker's base topic and may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub path: String,
    pub payload: Value,
}

impl Message {
    pub fn new(path: impl Into<String>, payload: Value) -> Self {
        Self {
            path: path.into(),
            payload,
        }
    }

    /// Insert `timestamp` into an object payload unless it already has one
    pub fn ensure_timestamp(&mut self) {
        if let Value::Object(map) = &mut self.payload {
            if !map.contains_key(TIMESTAMP_KEY) {
                map.insert(TIMESTAMP_KEY.to_string(), Value::String(local_timestamp()));
            }
        }
    }

    /// Build the error message for a failed device or calculation unit
    pub fn error(building_block: &str, report: ErrorReport) -> Self {
        let payload = serde_json::to_value(&report).unwrap_or(Value::Null);
        Self::new(format!("/error/{}", building_block), payload)
    }
}

/// Which layer produced a contained fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// A device failed to produce a sample
    Device,
    /// A calculation unit failed inside a pipeline
    Calculation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Device => write!(f, "device"),
            ErrorKind::Calculation => write!(f, "calculation"),
        }
    }
}

/// Payload of an error message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Device or calculation unit name
    pub id: String,
    pub reason: String,
    pub timestamp: String,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            reason: reason.into(),
            timestamp: local_timestamp(),
        }
    }
}
