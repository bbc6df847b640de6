//! Ordered chain of calculation units

use super::error::{StackError, StackResult};
use crate::capability::SharedCalculation;
use crate::types::Variables;
use std::collections::HashMap;

/// One resolved step. `unit` is `None` when the named unit failed to load.
struct Step {
    name: String,
    unit: Option<SharedCalculation>,
}

/// A named list of calculation units executed against one variable mapping.
///
/// Units run in reverse of the declared order: `[a, b, c]` executes
/// `c`, then `b`, then `a`.
pub struct Pipeline {
    name: String,
    spec: Vec<String>,
    steps: Vec<Step>,
    initialised: bool,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, spec: Vec<String>) -> Self {
        Self {
            name: name.into(),
            spec,
            steps: Vec::new(),
            initialised: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve unit names against the loaded calculation units.
    ///
    /// A name with no loaded unit is kept as an unusable step so the
    /// failure surfaces as a calculation error on execution.
    pub fn initialise(&mut self, units: &HashMap<String, SharedCalculation>) {
        self.steps = self
            .spec
            .iter()
            .rev()
            .map(|name| {
                let unit = units.get(name).cloned();
                if unit.is_none() {
                    tracing::error!(
                        "Pipeline '{}': calculation unit '{}' is not loaded",
                        self.name,
                        name
                    );
                }
                Step {
                    name: name.clone(),
                    unit,
                }
            })
            .collect();
        self.initialised = true;
    }

    /// Unit names in the order they execute
    pub fn execution_order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Run every unit in execution order, threading the mapping through.
    ///
    /// The first failing unit aborts the chain for this execution only.
    pub fn execute(&self, sample: Variables) -> StackResult<Variables> {
        if !self.initialised {
            return Err(StackError::calculation(
                self.name.as_str(),
                "pipeline not initialised",
            ));
        }

        let mut vars = sample;
        for step in &self.steps {
            let unit = step.unit.as_ref().ok_or_else(|| {
                StackError::calculation(step.name.as_str(), "calculation unit not loaded")
            })?;
            vars = unit.calculate(vars).map_err(|e| {
                tracing::error!("Pipeline '{}': '{}' failed: {}", self.name, step.name, e);
                StackError::calculation(step.name.as_str(), e.to_string())
            })?;
        }
        Ok(vars)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("execution_order", &self.execution_order())
            .finish()
    }
}
