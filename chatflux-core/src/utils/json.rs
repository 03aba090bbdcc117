//! JSON helpers shared by the wire encoders.

use serde_json::Value;

/// `f32` as JSON without widening noise (`0.7`, not `0.699999988079071`).
pub fn json_f32(value: f32) -> Value {
    value
        .to_string()
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
