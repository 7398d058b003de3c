use core_types::FlatFieldMap;
use serde_json::Value;

use crate::render::render_text;

/// Field name per positional slot, read from an embedded order descriptor.
/// Entries without a string under `field_key` leave their slot unnamed.
pub fn decode_order(descriptor: &Value, field_key: &str) -> Vec<Option<String>> {
    descriptor
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|e| e.get(field_key).and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Overwrites each slot whose field is present in `view` with the rendered
/// value. Slots beyond `values.len()` are ignored; the row keeps its length.
/// Returns the number of slots written.
pub fn apply_order(order: &[Option<String>], values: &mut [Value], view: &FlatFieldMap) -> usize {
    let mut written = 0;
    for (slot, field) in values.iter_mut().zip(order) {
        let Some(text) = field
            .as_deref()
            .and_then(|f| view.get(f))
            .and_then(render_text)
        else {
            continue;
        };
        *slot = Value::String(text);
        written += 1;
    }
    written
}
