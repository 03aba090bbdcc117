//! Structural JSON comparison with path-level diffs.

use serde_json::Value;

const MAX_REPORTED: usize = 50;

/// Differences between `expected` and `actual`, one line per mismatching path.
///
/// Object key order is ignored; array order is not. Numbers compare by value, so
/// `1` and `1.0` are equal.
pub fn json_diffs(expected: &Value, actual: &Value) -> Vec<String> {
    let mut diffs = Vec::new();
    compare(expected, actual, "$", &mut diffs);
    diffs
}

/// Panics with a path-level report if the two values differ in shape or value.
pub fn assert_same_json(expected: &Value, actual: &Value) {
    let diffs = json_diffs(expected, actual);
    if diffs.is_empty() {
        return;
    }
    let mut details = diffs
        .iter()
        .take(MAX_REPORTED)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    if diffs.len() > MAX_REPORTED {
        details.push_str(&format!("\n... ({} more)", diffs.len() - MAX_REPORTED));
    }
    panic!("request JSON mismatch (shape and/or values)\n{details}");
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn compare(expected: &Value, actual: &Value, path: &str, diffs: &mut Vec<String>) {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => {
            let mut missing: Vec<_> = e.keys().filter(|k| !a.contains_key(*k)).collect();
            missing.sort();
            for key in missing {
                diffs.push(format!("{path}.{key}: missing property"));
            }
            let mut extra: Vec<_> = a.keys().filter(|k| !e.contains_key(*k)).collect();
            extra.sort();
            for key in extra {
                diffs.push(format!("{path}.{key}: extra property"));
            }
            let mut shared: Vec<_> = e.keys().filter(|k| a.contains_key(*k)).collect();
            shared.sort();
            for key in shared {
                compare(&e[key], &a[key], &format!("{path}.{key}"), diffs);
            }
        }
        (Value::Array(e), Value::Array(a)) => {
            if e.len() != a.len() {
                diffs.push(format!(
                    "{path}: array length mismatch, expected {}, actual {}",
                    e.len(),
                    a.len()
                ));
            }
            for (i, (ev, av)) in e.iter().zip(a.iter()).enumerate() {
                compare(ev, av, &format!("{path}[{i}]"), diffs);
            }
        }
        (Value::String(e), Value::String(a)) => {
            if e != a {
                diffs.push(format!(
                    "{path}: string mismatch, expected={}, actual={}",
                    preview(e),
                    preview(a)
                ));
            }
        }
        (Value::Number(e), Value::Number(a)) => {
            let same = match (e.as_f64(), a.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => e == a,
            };
            if !same {
                diffs.push(format!("{path}: number mismatch, expected={e}, actual={a}"));
            }
        }
        (Value::Bool(e), Value::Bool(a)) => {
            if e != a {
                diffs.push(format!("{path}: bool mismatch, expected={e}, actual={a}"));
            }
        }
        (Value::Null, Value::Null) => {}
        (e, a) => diffs.push(format!(
            "{path}: kind mismatch, expected {}, actual {}",
            kind(e),
            kind(a)
        )),
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 200;
    let shown = match s.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    };
    Value::String(shown).to_string()
}
