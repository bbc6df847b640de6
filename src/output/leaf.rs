//! Leaf grammar of output specs
//!
//! | Leaf | Result |
//! |---|---|
//! | `"#abc"` | the string `"abc"` |
//! | `"=true"`, `"=False"`, `"=NULL"` | `true`, `false`, `null` |
//! | `"=12"` / `"=1.5"` | integer / float |
//! | `"=xyz"` | the string `"xyz"`, with a warning |
//! | any other string | a path query against the variables |
//! | non-string JSON | itself |

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// Resolve against the input
    Path(String),
    /// Emit as-is
    Literal(Value),
}

pub fn classify(leaf: &Value) -> Leaf {
    let Value::String(raw) = leaf else {
        return Leaf::Literal(leaf.clone());
    };

    if let Some(text) = raw.strip_prefix('#') {
        return Leaf::Literal(Value::String(text.to_string()));
    }
    match raw.strip_prefix('=') {
        Some(text) => Leaf::Literal(parse_literal(text, raw)),
        None if raw.is_empty() => Leaf::Literal(Value::String(String::new())),
        None => Leaf::Path(raw.clone()),
    }
}

fn parse_literal(text: &str, raw: &str) -> Value {
    match text.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(int) = text.parse::<i64>() {
        return Value::from(int);
    }
    if let Some(number) = text
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        return Value::Number(number);
    }
    tracing::warn!("Unable to parse literal '{}', treating it as a string", raw);
    Value::String(text.to_string())
}
