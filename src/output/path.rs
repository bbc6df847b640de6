//! Path queries over JSON documents
//!
//! Supported syntax:
//!
//! | Form | Meaning |
//! |---|---|
//! | `$` | the document root (optional prefix) |
//! | `.name` / `['name']` | object member |
//! | `[n]` | array element |
//! | `.*` / `[*]` | every member or element |
//! | `..name` | `name` at any depth below |
//!
//! A query without `$` starts with a member name, so `a.b.c` and `$.a.b.c`
//! are the same query.
//!
//! Matches carry their location in the flat-key format used by the
//! transformer (`a.b.[0].c`).

use crate::error::TransformError;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Member(String),
    Index(usize),
    Wildcard,
    Descendant(String),
}

/// A parsed path query
#[derive(Debug, Clone, PartialEq)]
pub struct PathQuery {
    source: String,
    segments: Vec<Segment>,
}

impl PathQuery {
    pub fn parse(expr: &str) -> Result<Self, TransformError> {
        let fail = |reason: &str| TransformError::InvalidPath {
            path: expr.to_string(),
            reason: reason.to_string(),
        };

        let chars: Vec<char> = expr.trim().chars().collect();
        if chars.is_empty() {
            return Err(fail("empty query"));
        }

        let mut segments = Vec::new();
        let mut i = 0;
        if chars[0] == '$' {
            i = 1;
        } else if chars[0] != '.' && chars[0] != '[' {
            let (name, next) = read_name(&chars, 0);
            segments.push(Segment::Member(name));
            i = next;
        }

        while i < chars.len() {
            match chars[i] {
                '.' if chars.get(i + 1) == Some(&'.') => {
                    let (name, next) = read_name(&chars, i + 2);
                    if name.is_empty() {
                        return Err(fail("expected a member name after '..'"));
                    }
                    segments.push(Segment::Descendant(name));
                    i = next;
                }
                '.' => {
                    if chars.get(i + 1) == Some(&'*') {
                        segments.push(Segment::Wildcard);
                        i += 2;
                        continue;
                    }
                    let (name, next) = read_name(&chars, i + 1);
                    if name.is_empty() {
                        return Err(fail("expected a member name after '.'"));
                    }
                    segments.push(Segment::Member(name));
                    i = next;
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|p| p + i)
                        .ok_or_else(|| fail("unclosed '['"))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    segments.push(bracket_segment(inner.trim()).ok_or_else(|| fail("bad bracket"))?);
                    i = close + 1;
                }
                other => {
                    return Err(fail(&format!("unexpected '{}'", other)));
                }
            }
        }

        Ok(Self {
            source: expr.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Every match in document order, with its flat location
    pub fn find<'a>(&self, document: &'a Value) -> Vec<(String, &'a Value)> {
        let mut current = vec![(String::new(), document)];
        for segment in &self.segments {
            let mut next = Vec::new();
            for (path, value) in current {
                step(segment, path, value, &mut next);
            }
            current = next;
        }
        current
    }
}

impl std::fmt::Display for PathQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn read_name(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

fn bracket_segment(inner: &str) -> Option<Segment> {
    if inner == "*" {
        return Some(Segment::Wildcard);
    }
    if let Ok(index) = inner.parse::<usize>() {
        return Some(Segment::Index(index));
    }
    let quoted = inner.len() >= 2
        && ((inner.starts_with('\'') && inner.ends_with('\''))
            || (inner.starts_with('"') && inner.ends_with('"')));
    quoted.then(|| Segment::Member(inner[1..inner.len() - 1].to_string()))
}

/// `base` + one more flat-key segment
pub(crate) fn join(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", base, segment)
    }
}

fn index_key(index: usize) -> String {
    format!("[{}]", index)
}

fn step<'a>(segment: &Segment, path: String, value: &'a Value, out: &mut Vec<(String, &'a Value)>) {
    match (segment, value) {
        (Segment::Member(name), Value::Object(map)) => {
            if let Some(child) = map.get(name) {
                out.push((join(&path, name), child));
            }
        }
        (Segment::Index(index), Value::Array(items)) => {
            if let Some(child) = items.get(*index) {
                out.push((join(&path, &index_key(*index)), child));
            }
        }
        (Segment::Wildcard, Value::Object(map)) => {
            for (key, child) in map {
                out.push((join(&path, key), child));
            }
        }
        (Segment::Wildcard, Value::Array(items)) => {
            for (index, child) in items.iter().enumerate() {
                out.push((join(&path, &index_key(index)), child));
            }
        }
        (Segment::Descendant(name), _) => descend(name, path, value, out),
        _ => {}
    }
}

fn descend<'a>(name: &str, path: String, value: &'a Value, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(name) {
                out.push((join(&path, name), child));
            }
            for (key, child) in map {
                descend(name, join(&path, key), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                descend(name, join(&path, &index_key(index)), child, out);
            }
        }
        _ => {}
    }
}
