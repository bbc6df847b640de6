//! Output transformer
//!
//! Reshapes a variable mapping into a payload following a declarative
//! spec. The spec is a JSON tree; each leaf is classified by [`leaf`] and
//! written at the leaf's own flat path:
//!
//! ```text
//! spec   {"power": {"l1": "$.p1", "unit": "#W"}, "ok": "=true"}
//! input  {"p1": 230.5, "p2": 12}
//! output {"power": {"l1": 230.5, "unit": "W"}, "ok": true}
//! ```
//!
//! With `append` the output starts from the flattened input, so keys the
//! spec does not mention are kept. A path leaf that moves a value also
//! removes it from its old location.

pub mod flat;
pub mod leaf;
pub mod path;

pub use flat::{flatten, unflatten, FlatMap};
pub use leaf::{classify, Leaf};
pub use path::PathQuery;

use crate::error::TransformError;
use serde_json::Value;

/// Build one payload from `input` according to `spec`
pub fn transform(input: &Value, spec: &Value, append: bool) -> Result<Value, TransformError> {
    let mut output = if append { flatten(input) } else { FlatMap::new() };

    for (target, leaf) in flatten(spec) {
        match classify(&leaf) {
            Leaf::Literal(value) => {
                output.insert(target, value);
            }
            Leaf::Path(expr) => {
                let query = PathQuery::parse(&expr)?;
                let mut matches = query.find(input);
                if matches.is_empty() {
                    tracing::warn!("Path '{}' matched nothing; '{}' left out", expr, target);
                    continue;
                }
                if matches.len() > 1 {
                    tracing::warn!(
                        "Path '{}' matched {} values; using the first",
                        expr,
                        matches.len()
                    );
                }
                let (source, value) = matches.swap_remove(0);
                output.insert(target.clone(), value.clone());
                if append && source != target {
                    output.shift_remove(&source);
                }
            }
        }
    }

    tracing::trace!("transform produced {} leaves", output.len());
    unflatten(&output)
}

/// Check every path leaf of a spec parses
pub fn check_spec(spec: &Value) -> Result<(), TransformError> {
    for (_, leaf) in flatten(spec) {
        if let Leaf::Path(expr) = classify(&leaf) {
            PathQuery::parse(&expr)?;
        }
    }
    Ok(())
}
