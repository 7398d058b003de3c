use core_types::RewriteError;
use serde_json::Value;

use crate::render::zeroed;
use crate::rule::{apply_bindings, FixedLeafRule, Selection};
use crate::RewriteContext;

pub(crate) fn apply(rule: &FixedLeafRule, doc: &mut Value, ctx: &RewriteContext) -> Result<usize, RewriteError> {
    let Some(path) = &rule.document else {
        return Ok(apply_leaves(rule, doc, ctx));
    };
    let mut payload = doc_path::decode_embedded(doc, path)
        .filter(|v| v.is_object() || v.is_array())
        .ok_or_else(|| RewriteError::Shape(format!("no embedded payload at `{path}`")))?;
    let written = apply_leaves(rule, &mut payload, ctx);
    doc_path::encode_embedded(doc, path, &payload)?;
    Ok(written)
}

fn apply_leaves(rule: &FixedLeafRule, target: &mut Value, ctx: &RewriteContext) -> usize {
    for path in &rule.zero_fill {
        if let Some(node) = doc_path::get_mut(target, path) {
            zero_fill(node);
        }
    }

    let Some(each) = &rule.each else {
        return apply_bindings(target, &rule.bindings, ctx);
    };
    let Some(items) = doc_path::get_mut(target, each).and_then(Value::as_array_mut) else {
        return 0;
    };
    match rule.select {
        Selection::All => items
            .iter_mut()
            .map(|item| apply_bindings(item, &rule.bindings, ctx))
            .sum(),
        Selection::Last => items
            .last_mut()
            .map(|item| apply_bindings(item, &rule.bindings, ctx))
            .unwrap_or(0),
    }
}

/// Zeroes every numeric leaf under `node`; labels and flags survive.
pub fn zero_fill(node: &mut Value) {
    match node {
        Value::Array(items) => items.iter_mut().for_each(zero_fill),
        Value::Object(map) => map.values_mut().for_each(zero_fill),
        leaf => {
            if let Some(z) = zeroed(leaf) {
                *leaf = z;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn zero_fill_keeps_shape_and_labels() {
        let mut node = json!({"2": [["Mobile", "12", 3.5], ["Tablet", "x1", true]], "9": null});
        zero_fill(&mut node);
        assert_eq!(node, json!({"2": [["Mobile", "0", 0], ["Tablet", "x1", true]], "9": null}));
    }
}
