//! Built-in devices
//!
//! - `testing.MockConstant` / `testing.MockRandom` - synthetic samples
//! - `one_wire.Ds18b20` - DS18B20 temperature probe via a `w1_slave` file
//! - `text.JsonLine` - one JSON document per line from a text interface

use super::interfaces::TextFile;
use super::{config_f64, config_value, require_f64, variable_or, Device, SharedInterface};
use crate::config::CapabilitySpec;
use crate::error::{CapabilityError, RegistryError};
use crate::output::path::PathQuery;
use crate::types::{f64_value, Variables};
use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

fn invalid(spec: &CapabilitySpec, message: impl Into<String>) -> RegistryError {
    RegistryError::InvalidConfig {
        module: spec.module.clone(),
        class: spec.class.clone(),
        message: message.into(),
    }
}

/// Take the bound interface as a [`TextFile`], or fail
fn text_interface(interface: &Option<SharedInterface>) -> Result<&TextFile, CapabilityError> {
    interface
        .as_ref()
        .and_then(|i| i.as_any().downcast_ref::<TextFile>())
        .ok_or_else(|| CapabilityError::new("device needs a file.TextFile interface"))
}

// ==================== Testing ====================

/// Always reports the configured `value`
pub struct MockConstant {
    variable: String,
    value: Value,
}

impl MockConstant {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        Ok(Self {
            variable: variable_or(spec, "variable", "value"),
            value: config_value(spec, "value")?,
        })
    }
}

#[async_trait]
impl Device for MockConstant {
    async fn initialise(&mut self, _: Option<SharedInterface>) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn sample(&mut self) -> Result<Variables, CapabilityError> {
        let mut vars = Variables::new();
        vars.insert(self.variable.clone(), self.value.clone());
        Ok(vars)
    }
}

/// Uniform random reading in `[min, max]`
pub struct MockRandom {
    variable: String,
    min: f64,
    max: f64,
}

impl MockRandom {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        let min = config_f64(spec, "min")?.unwrap_or(0.0);
        let max = require_f64(spec, "max")?;
        if !(min <= max) {
            return Err(invalid(spec, format!("min {} exceeds max {}", min, max)));
        }
        Ok(Self {
            variable: variable_or(spec, "variable", "value"),
            min,
            max,
        })
    }
}

#[async_trait]
impl Device for MockRandom {
    async fn initialise(&mut self, _: Option<SharedInterface>) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn sample(&mut self) -> Result<Variables, CapabilityError> {
        let reading = rand::thread_rng().gen_range(self.min..=self.max);
        let mut vars = Variables::new();
        vars.insert(self.variable.clone(), f64_value(reading));
        Ok(vars)
    }
}

// ==================== One-Wire ====================

/// DS18B20 reading from a `w1_slave` file.
///
/// The kernel driver writes two lines; the first ends in `YES` when the
/// CRC matched, the second carries `t=<milli-degrees>`.
pub struct Ds18b20 {
    variable: String,
    interface: Option<SharedInterface>,
}

impl Ds18b20 {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        Ok(Self {
            variable: variable_or(spec, "temperature", "temperature"),
            interface: None,
        })
    }
}

/// Degrees Celsius from `w1_slave` content
pub fn parse_w1_slave(content: &str) -> Result<f64, CapabilityError> {
    let mut lines = content.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| CapabilityError::new("empty w1_slave reading"))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(CapabilityError::new("w1_slave CRC check failed"));
    }

    let data_line = lines
        .next()
        .ok_or_else(|| CapabilityError::new("w1_slave reading has no data line"))?;
    let raw = data_line
        .split("t=")
        .nth(1)
        .ok_or_else(|| CapabilityError::new("w1_slave data line has no 't='"))?;
    let milli: i64 = raw
        .trim()
        .parse()
        .map_err(|_| CapabilityError::new(format!("bad w1_slave temperature '{}'", raw.trim())))?;
    Ok(milli as f64 / 1000.0)
}

#[async_trait]
impl Device for Ds18b20 {
    async fn initialise(
        &mut self,
        interface: Option<SharedInterface>,
    ) -> Result<(), CapabilityError> {
        text_interface(&interface)?;
        self.interface = interface;
        Ok(())
    }

    async fn sample(&mut self) -> Result<Variables, CapabilityError> {
        let content = text_interface(&self.interface)?.read_all().await?;
        let celsius = parse_w1_slave(&content)?;
        let mut vars = Variables::new();
        vars.insert(self.variable.clone(), f64_value(celsius));
        Ok(vars)
    }
}

// ==================== Text ====================

/// One JSON object per line.
///
/// Without `spec` the whole object becomes the sample. With `spec`
/// (`{output_key = "path.query"}`) only the first match of each query is
/// kept; queries with no match are left out.
pub struct JsonLine {
    extract: Vec<(String, PathQuery)>,
    interface: Option<SharedInterface>,
}

impl JsonLine {
    pub fn from_spec(spec: &CapabilitySpec) -> Result<Self, RegistryError> {
        let mut extract = Vec::new();
        match spec.config.get("spec") {
            None => {}
            Some(toml::Value::Table(table)) => {
                for (key, value) in table {
                    let expr = value
                        .as_str()
                        .ok_or_else(|| invalid(spec, format!("spec.{} must be a string", key)))?;
                    let query =
                        PathQuery::parse(expr).map_err(|e| invalid(spec, e.to_string()))?;
                    extract.push((key.clone(), query));
                }
            }
            Some(_) => return Err(invalid(spec, "'spec' must be a table")),
        }
        Ok(Self {
            extract,
            interface: None,
        })
    }

    fn decode(&self, line: &str) -> Result<Variables, CapabilityError> {
        let cleaned = quote_hex_literals(line.trim());
        let document: Value = serde_json::from_str(&cleaned)
            .map_err(|e| CapabilityError::new(format!("bad JSON line: {}", e)))?;

        if self.extract.is_empty() {
            return match document {
                Value::Object(map) => Ok(map),
                other => Err(CapabilityError::new(format!(
                    "expected a JSON object, got {}",
                    other
                ))),
            };
        }

        let mut vars = Variables::new();
        for (key, query) in &self.extract {
            if let Some((_, value)) = query.find(&document).into_iter().next() {
                vars.insert(key.clone(), value.clone());
            }
        }
        Ok(vars)
    }
}

/// Meters emit bare register values like `0x1F`; quote them so the line
/// parses as JSON
fn quote_hex_literals(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len() + 8);
    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' && (i == 0 || chars[i - 1] != '\\') {
            in_string = !in_string;
        }
        let is_hex = !in_string
            && c == '0'
            && i + 3 < chars.len()
            && chars[i + 1] == 'x'
            && chars[i + 2].is_ascii_hexdigit()
            && chars[i + 3].is_ascii_hexdigit();
        if is_hex {
            out.push('"');
            out.extend(&chars[i..i + 4]);
            out.push('"');
            i += 4;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

#[async_trait]
impl Device for JsonLine {
    async fn initialise(
        &mut self,
        interface: Option<SharedInterface>,
    ) -> Result<(), CapabilityError> {
        text_interface(&interface)?;
        self.interface = interface;
        Ok(())
    }

    async fn sample(&mut self) -> Result<Variables, CapabilityError> {
        let line = text_interface(&self.interface)?.read_line().await?;
        self.decode(&line)
    }
}
