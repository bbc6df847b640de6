//! Sensing-stack error types.

use crate::types::{ErrorKind, ErrorReport};
use thiserror::Error;

/// Faults raised while executing one sensing stack.
///
/// These are the recoverable steady-state errors: the supervisor reports
/// them as error messages and keeps running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StackError {
    #[error("Sample error from device '{device}': {reason}")]
    Sample { device: String, reason: String },

    #[error("Calculation error in '{module}': {reason}")]
    Calculation { module: String, reason: String },
}

impl StackError {
    pub fn sample(device: impl Into<String>, reason: impl Into<String>) -> Self {
        StackError::Sample {
            device: device.into(),
            reason: reason.into(),
        }
    }

    pub fn calculation(module: impl Into<String>, reason: impl Into<String>) -> Self {
        StackError::Calculation {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Body of the error message published for this fault
    pub fn report(&self) -> ErrorReport {
        match self {
            StackError::Sample { device, reason } => {
                ErrorReport::new(ErrorKind::Device, device.as_str(), reason.as_str())
            }
            StackError::Calculation { module, reason } => {
                ErrorReport::new(ErrorKind::Calculation, module.as_str(), reason.as_str())
            }
        }
    }
}

pub type StackResult<T> = std::result::Result<T, StackError>;
