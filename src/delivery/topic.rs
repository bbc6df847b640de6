//! Topic construction
//!
//! The topic is the base template joined with the message path, then
//! rendered as a mustache template (via the `mustache` crate) against the
//! payload fields, with the machine's constants layered on top. Sections,
//! inverted sections and dotted names all behave as in any other mustache
//! renderer; missing fields render as empty text and `{{var}}` output is
//! HTML-escaped.

use crate::error::TransportError;
use crate::types::Variables;
use serde_json::Value;

/// `base` and `path` joined by exactly one `/`
pub fn join(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return path.to_string();
    }
    format!("{}/{}", base, path)
}

fn compile(template: &str) -> Result<mustache::Template, TransportError> {
    mustache::compile_str(template)
        .map_err(|e| TransportError::Template(format!("'{}': {}", template, e)))
}

/// Fails if `template` is not valid mustache
pub fn check_template(template: &str) -> Result<(), TransportError> {
    compile(template).map(|_| ())
}

/// Render `template` against `context`
pub fn render(template: &str, context: &Variables) -> Result<String, TransportError> {
    let mut out = Vec::with_capacity(template.len());
    compile(template)?
        .render(&mut out, context)
        .map_err(|e| TransportError::Template(e.to_string()))?;
    String::from_utf8(out).map_err(|e| TransportError::Template(e.to_string()))
}

/// Topic for a message: payload fields overlaid with `constants`
pub fn topic_for(
    template: &str,
    path: &str,
    payload: &Value,
    constants: &Variables,
) -> Result<String, TransportError> {
    let mut context = payload.as_object().cloned().unwrap_or_default();
    for (key, value) in constants {
        context.insert(key.clone(), value.clone());
    }
    render(&join(template, path), &context)
}
