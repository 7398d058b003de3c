use core_types::RewriteError;
use serde_json::Value;

use crate::descriptor::{apply_order, decode_order};
use crate::rule::{apply_bindings, ListingRule};
use crate::RewriteContext;

pub(crate) fn apply(rule: &ListingRule, doc: &mut Value, ctx: &RewriteContext) -> Result<usize, RewriteError> {
    if rule.documents.is_empty() {
        return Ok(rewrite_listing(rule, doc, ctx));
    }

    let mut written = 0;
    for path in &rule.documents {
        let mut listing = doc_path::decode_embedded(doc, path)
            .filter(Value::is_object)
            .ok_or_else(|| RewriteError::Shape(format!("no embedded listing at `{path}`")))?;
        written += rewrite_listing(rule, &mut listing, ctx);
        doc_path::encode_embedded(doc, path, &listing)?;
    }
    Ok(written)
}

fn rewrite_listing(rule: &ListingRule, listing: &mut Value, ctx: &RewriteContext) -> usize {
    // the descriptor is per document; slot meaning can differ between responses
    let order = doc_path::get(listing, &rule.descriptor)
        .map(|d| decode_order(d, &rule.descriptor_field_key))
        .unwrap_or_default();

    let Some(rows) = doc_path::get_mut(listing, &rule.rows).and_then(Value::as_array_mut) else {
        return 0;
    };

    let mut written = 0;
    for row in rows.iter_mut() {
        let view = ctx.view(rule.view.pick(row));
        if let Some(values) = doc_path::get_mut(row, &rule.values).and_then(Value::as_array_mut) {
            written += apply_order(&order, values, view);
        }
        written += apply_bindings(row, &rule.row_bindings, ctx);
    }
    written
}
