use std::collections::BTreeMap;

use core_types::ViewKind;
use doc_path::DocPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::render::render_text;
use crate::RewriteContext;

/// One endpoint's rewrite, chosen by the `kind` tag in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewriteRule {
    Listing(ListingRule),
    FixedLeaf(FixedLeafRule),
}

/// Row listings whose value arrays are described by an order descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRule {
    /// String slots holding the listing documents. Empty means the response
    /// body itself is the listing.
    #[serde(default)]
    pub documents: Vec<DocPath>,
    #[serde(default = "default_rows")]
    pub rows: DocPath,
    /// Value array inside each row.
    #[serde(default = "default_values")]
    pub values: DocPath,
    #[serde(default = "default_descriptor")]
    pub descriptor: DocPath,
    #[serde(default = "default_field_key")]
    pub descriptor_field_key: String,
    #[serde(default)]
    pub view: ViewSelector,
    /// Extra per-row leaves, with paths relative to the row.
    #[serde(default)]
    pub row_bindings: Vec<LeafBinding>,
}

fn default_rows() -> DocPath {
    DocPath::parse("1")
}

fn default_values() -> DocPath {
    DocPath::parse("200.1")
}

fn default_descriptor() -> DocPath {
    DocPath::parse("2.2")
}

fn default_field_key() -> String {
    "3".to_string()
}

/// Documents without a descriptor: a fixed set of leaves is overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedLeafRule {
    /// String slot holding the real payload, if the body wraps one.
    #[serde(default)]
    pub document: Option<DocPath>,
    /// Subtrees whose numeric leaves are zeroed before bindings apply. Empty
    /// leaves every unbound value as the origin sent it.
    #[serde(default)]
    pub zero_fill: Vec<DocPath>,
    /// When set, bindings apply to elements of this array rather than to the
    /// document root.
    #[serde(default)]
    pub each: Option<DocPath>,
    #[serde(default)]
    pub select: Selection,
    #[serde(default)]
    pub bindings: Vec<LeafBinding>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    All,
    Last,
}

/// Which derived view feeds a listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum ViewSelector {
    Fixed {
        view: ViewKind,
    },
    /// Picks the view from the text at `key` inside the row (e.g. a device
    /// class code).
    RowKey {
        key: DocPath,
        cases: BTreeMap<String, ViewKind>,
        default: ViewKind,
    },
}

impl Default for ViewSelector {
    fn default() -> Self {
        Self::Fixed {
            view: ViewKind::Base,
        }
    }
}

impl ViewSelector {
    pub fn pick(&self, row: &Value) -> ViewKind {
        match self {
            Self::Fixed { view } => *view,
            Self::RowKey {
                key,
                cases,
                default,
            } => doc_path::get(row, key)
                .and_then(render_text)
                .and_then(|k| cases.get(&k).copied())
                .unwrap_or(*default),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafBinding {
    pub path: DocPath,
    pub source: BindingSource,
    #[serde(default)]
    pub render: Render,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum BindingSource {
    View { view: ViewKind, field: String },
    /// Dotted path into the canonical dataset, e.g. `bill.balance`.
    Dataset { path: DocPath },
    /// Written as an array; absent if any item is absent.
    List { items: Vec<BindingSource> },
    Literal { value: Value },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Render {
    #[default]
    Raw,
    Text,
}

impl BindingSource {
    pub fn resolve(&self, ctx: &RewriteContext, render: Render) -> Option<Value> {
        match self {
            Self::View { view, field } => finish(ctx.view(*view).get(field)?, render),
            Self::Dataset { path } => finish(ctx.dataset_value(path)?, render),
            Self::List { items } => items
                .iter()
                .map(|item| item.resolve(ctx, render))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Self::Literal { value } => finish(value, render),
        }
    }
}

fn finish(v: &Value, render: Render) -> Option<Value> {
    match render {
        Render::Raw if v.is_null() => None,
        Render::Raw => Some(v.clone()),
        Render::Text => render_text(v).map(Value::String),
    }
}

/// Writes every resolvable binding into `target`. A binding whose source is
/// absent, or whose position does not exist in the document, is skipped so
/// the original value stays. Returns the number of leaves written.
pub(crate) fn apply_bindings(target: &mut Value, bindings: &[LeafBinding], ctx: &RewriteContext) -> usize {
    let mut written = 0;
    for binding in bindings {
        if doc_path::get(target, &binding.path).is_none() {
            tracing::trace!(path = %binding.path, "binding target absent");
            continue;
        }
        let Some(value) = binding.source.resolve(ctx, binding.render) else {
            continue;
        };
        if doc_path::set(target, &binding.path, value).is_ok() {
            written += 1;
        }
    }
    written
}
