use serde_json::{Number, Value};

/// Text form of a scalar as the host page expects it: integral floats lose
/// their fractional part (`20.0` -> `"20"`).
pub fn render_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(render_number(n)),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn render_number(n: &Number) -> String {
    match n.as_f64() {
        Some(x) if n.is_f64() && x.fract() == 0.0 && x.abs() < 1e15 => format!("{}", x as i64),
        _ => n.to_string(),
    }
}

/// Numeric leaf replacement used by zero-fill. Numbers become `0`, strings
/// that parse as numbers become `"0"`, everything else is left alone.
pub fn zeroed(v: &Value) -> Option<Value> {
    match v {
        Value::Number(_) => Some(Value::from(0)),
        Value::String(s) if s.trim().parse::<f64>().is_ok_and(f64::is_finite) => {
            Some(Value::String("0".to_string()))
        }
        _ => None,
    }
}
