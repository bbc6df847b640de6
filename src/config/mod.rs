//! Configuration module for telemetryd
//!
//! One TOML document describes one machine: its interfaces, devices,
//! calculation units, pipelines, measurement scheduler, output channels and
//! broker connection.
//!
//! # Config Location
//!
//! Looked up in this order:
//! 1. `TELEMETRYD_CONFIG` - a file, or a directory of `*.toml` files
//! 2. `./config`
//! 3. The platform config directory:
//!    - **Linux**: `~/.config/telemetryd/`
//!    - **macOS**: `~/Library/Application Support/telemetryd/`
//!    - **Windows**: `%APPDATA%\telemetryd\`
//!
//! A directory yields one machine per `*.toml` file, in file-name order.
//!
//! # Example
//!
//! ```ignore
//! use telemetryd::config::{discover, DaemonConfig};
//!
//! let path = discover().expect("no config");
//! for machine in DaemonConfig::load_all(&path)? {
//!     let report = machine.validate();
//!     report.log(&machine.name);
//! }
//! ```

pub mod settings;
pub mod validate;

pub use settings::*;
pub use validate::{validate, ValidationReport};

use crate::error::{ResultExt, Result, TelemetryError};
use crate::types::Variables;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config location
pub const CONFIG_ENV: &str = "TELEMETRYD_CONFIG";

/// Directory name under the platform config dir
pub const APP_DIR: &str = "telemetryd";

/// Directory checked relative to the working directory
pub const LOCAL_CONFIG_DIR: &str = "config";

/// Config file extension
pub const CONFIG_FILE_EXTENSION: &str = "toml";

// ==================== Discovery ====================

/// Platform config directory for telemetryd
pub fn default_config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_DIR))
}

/// Find the config location using the process environment
pub fn discover() -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    discover_from(std::env::var_os(CONFIG_ENV), &cwd, default_config_dir())
}

/// Discovery with every input explicit.
///
/// An override is returned even if it does not exist so the caller reports
/// it instead of silently falling back.
pub fn discover_from(
    override_path: Option<OsString>,
    cwd: &Path,
    platform_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = override_path.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }

    let local = cwd.join(LOCAL_CONFIG_DIR);
    if local.exists() {
        return Some(local);
    }

    platform_dir.filter(|dir| dir.exists())
}

/// Config files at `path`: the file itself, or the sorted `*.toml` files
/// of a directory
pub fn config_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(TelemetryError::Config(format!(
            "config path {:?} does not exist",
            path
        )));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("Failed to list config directory {:?}", path))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(CONFIG_FILE_EXTENSION)
        })
        .collect();
    files.sort();
    Ok(files)
}

// ==================== Machine Config ====================

/// Full configuration of one machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Building-block name used in error paths and logs.
    /// Defaults to the config file stem.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub interface: BTreeMap<String, CapabilitySpec>,

    #[serde(default)]
    pub device: BTreeMap<String, CapabilitySpec>,

    #[serde(default)]
    pub calculation: BTreeMap<String, CapabilitySpec>,

    /// Pipeline name -> calculation unit names in declared order
    #[serde(default)]
    pub pipelines: BTreeMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<MeasurementConfig>,

    #[serde(default)]
    pub output: BTreeMap<String, OutputChannel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<MqttConfig>,

    /// Extra fields available to topic templates
    #[serde(default)]
    pub constants: Variables,

    #[serde(default)]
    pub runtime: RuntimeSettings,
}

impl DaemonConfig {
    /// Parse a document; `default_name` is used when it has no `name`
    pub fn from_toml_str(content: &str, default_name: &str) -> Result<Self> {
        let mut config: DaemonConfig = toml::from_str(content)?;
        if config.name.is_empty() {
            config.name = default_name.to_string();
        }
        Ok(config)
    }

    /// Load one config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(APP_DIR);

        let config = Self::from_toml_str(&content, stem)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        tracing::info!("Loaded config '{}' from {:?}", config.name, path);
        Ok(config)
    }

    /// Load every machine config at `path` (file or directory)
    pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        config_files(path.as_ref())?
            .iter()
            .map(Self::load)
            .collect()
    }

    pub fn validate(&self) -> ValidationReport {
        validate(self)
    }

    /// Broker settings, defaulted when the section is absent
    pub fn mqtt_or_default(&self) -> MqttConfig {
        self.mqtt.clone().unwrap_or_default()
    }
}
