//! Error handling for telemetryd
//!
//! Each layer owns a narrow error type (capabilities, registry, stacks,
//! transforms, transport). [`TelemetryError`] wraps them for the places that
//! need a single crate-level error, mainly startup and configuration.

use thiserror::Error;

/// Failure reported by an interface, device or calculation unit.
///
/// Capabilities only describe what went wrong; the layer that called them
/// attaches the identity (device name, unit name).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct CapabilityError(pub String);

impl CapabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for CapabilityError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

/// Errors raised while resolving a capability spec into a live instance
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("unknown {kind} module '{module}'")]
    UnknownModule { kind: &'static str, module: String },

    #[error("unknown {kind} class '{class}' in module '{module}'")]
    UnknownClass {
        kind: &'static str,
        module: String,
        class: String,
    },

    #[error("invalid config for {module}.{class}: {message}")]
    InvalidConfig {
        module: String,
        class: String,
        message: String,
    },
}

/// Errors raised while rebuilding a nested payload from flat paths
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Array elements must be created in index order
    #[error("array index {index} at '{path}' skips ahead of length {len}")]
    IndexOutOfOrder { path: String, index: usize, len: usize },

    /// The same path is used both as an object and an array (or leaf)
    #[error("conflicting shapes at '{path}'")]
    ShapeConflict { path: String },

    /// A path reference that cannot be parsed
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Errors raised by the broker transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("disconnected: {0}")]
    Disconnected(String),

    #[error("publish failed: {0}")]
    Publish(String),

    /// The client's request buffer is full; poll, then publish again
    #[error("request buffer full")]
    Busy,

    #[error("bad topic template: {0}")]
    Template(String),
}

/// Main error type for telemetryd
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Errors related to configuration loading/validation
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Stack(#[from] crate::pipeline::StackError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Scheduler wiring or aggregation problems
    #[error("Measurement error: {0}")]
    Measurement(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TelemetryError>,
    },
}

impl TelemetryError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TelemetryError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for telemetryd operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<TelemetryError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::Config("missing [mqtt] section".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing [mqtt] section");
    }

    #[test]
    fn test_error_with_context() {
        let err = TelemetryError::Config("bad".to_string());
        let with_ctx = err.with_context("Failed to load machine.toml");
        assert!(with_ctx.to_string().contains("Failed to load machine.toml"));
    }

    #[test]
    fn test_result_ext_on_foreign_error() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        let err = res.context("reading config").unwrap_err();
        assert!(err.to_string().starts_with("reading config"));
    }

    #[test]
    fn test_transform_error_display() {
        let err = TransformError::IndexOutOfOrder {
            path: "a.[2]".to_string(),
            index: 2,
            len: 0,
        };
        assert!(err.to_string().contains("a.[2]"));
    }
}
