//! Window averaging of variable mappings
//!
//! Per key, over the samples that carry it:
//! - all numbers → arithmetic mean (always a float)
//! - no numbers → mode; ties go to the value seen first
//! - a mix of both → error
//!
//! Output keys keep first-seen order.

use crate::types::{f64_value, is_numeric, Variables};
use serde_json::Value;

/// Average a window of samples
pub fn average(samples: &[Variables]) -> Result<Variables, String> {
    let mut columns: Vec<(&str, Vec<&Value>)> = Vec::new();
    for sample in samples {
        for (key, value) in sample {
            match columns.iter_mut().find(|(k, _)| *k == key.as_str()) {
                Some((_, values)) => values.push(value),
                None => columns.push((key.as_str(), vec![value])),
            }
        }
    }

    let mut out = Variables::new();
    for (key, values) in columns {
        let numeric = values.iter().filter(|v| is_numeric(v)).count();
        let value = if numeric == values.len() {
            mean(&values)
        } else if numeric == 0 {
            mode(&values)
        } else {
            return Err(format!(
                "variable '{}' mixes numeric and non-numeric values in one window",
                key
            ));
        };
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

fn mean(values: &[&Value]) -> Value {
    let sum: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
    f64_value(sum / values.len() as f64)
}

fn mode(values: &[&Value]) -> Value {
    let mut counts: Vec<(&Value, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == *value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }

    // first maximum wins ties
    let mut best: Option<(&Value, usize)> = None;
    for (value, n) in counts {
        if best.map_or(true, |(_, top)| n > top) {
            best = Some((value, n));
        }
    }
    best.map(|(v, _)| v.clone()).unwrap_or(Value::Null)
}

/// Fixed-size buffer of samples feeding [`average`]
#[derive(Debug, Clone)]
pub struct Window {
    size: usize,
    samples: Vec<Variables>,
}

impl Window {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            samples: Vec::with_capacity(size),
        }
    }

    /// Samples collected so far in this window
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.size
    }

    pub fn push(&mut self, sample: Variables) {
        self.samples.push(sample);
    }

    /// Average the collected samples and start a new window
    pub fn drain_average(&mut self) -> Result<Variables, String> {
        let samples = std::mem::take(&mut self.samples);
        average(&samples)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_numeric_mean() {
        let out = average(&[vars(json!({"x": 1})), vars(json!({"x": 2})), vars(json!({"x": 3}))])
            .unwrap();
        assert_eq!(out["x"], json!(2.0));
    }

    #[test]
    fn test_string_mode() {
        let out = average(&[
            vars(json!({"s": "a"})),
            vars(json!({"s": "a"})),
            vars(json!({"s": "b"})),
        ])
        .unwrap();
        assert_eq!(out["s"], "a");
    }

    #[test]
    fn test_mode_tie_goes_to_first_seen() {
        let out = average(&[vars(json!({"s": "b"})), vars(json!({"s": "a"}))]).unwrap();
        assert_eq!(out["s"], "b");

        let out = average(&[vars(json!({"on": true})), vars(json!({"on": false})), vars(json!({"on": false}))])
            .unwrap();
        assert_eq!(out["on"], false);
    }

    #[test]
    fn test_mixed_types_rejected() {
        let err = average(&[vars(json!({"x": 1})), vars(json!({"x": "1"}))]).unwrap_err();
        assert!(err.contains("'x'"));
    }

    #[test]
    fn test_keys_missing_from_some_samples() {
        let out = average(&[vars(json!({"a": 1, "b": 10})), vars(json!({"a": 3}))]).unwrap();
        assert_eq!(out["a"], json!(2.0));
        assert_eq!(out["b"], json!(10.0));
        let keys: Vec<_> = out.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_window_cycle() {
        let mut window = Window::new(2);
        window.push(vars(json!({"x": 1})));
        assert!(!window.is_full());
        window.push(vars(json!({"x": 5})));
        assert!(window.is_full());
        assert_eq!(window.drain_average().unwrap()["x"], json!(3.0));
        assert!(window.is_empty());
    }

    proptest! {
        #[test]
        fn prop_mean_within_bounds(xs in prop::collection::vec(-1.0e6f64..1.0e6, 1..32)) {
            let samples: Vec<Variables> = xs.iter().map(|x| vars(json!({"v": x}))).collect();
            let out = average(&samples).unwrap();
            let v = out["v"].as_f64().unwrap();
            let lo = xs.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(v >= lo - 1e-6 && v <= hi + 1e-6);
        }

        #[test]
        fn prop_constant_window_is_fixed_point(x in -1.0e6f64..1.0e6, n in 1usize..16) {
            let samples: Vec<Variables> = (0..n).map(|_| vars(json!({"v": x}))).collect();
            let out = average(&samples).unwrap();
            prop_assert!((out["v"].as_f64().unwrap() - x).abs() < 1e-6);
        }
    }
}
