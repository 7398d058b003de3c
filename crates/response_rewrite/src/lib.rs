//! Per-endpoint rewriting of positionally keyed response documents.
//!
//! Every rewrite works on a private parsed copy of the body, so an error at
//! any step leaves the caller holding the original text.

pub mod descriptor;
pub mod fixed_leaf;
mod listing;
pub mod render;
pub mod rule;

use std::sync::Arc;

use core_types::{FlatFieldMap, RewriteError, Snapshot, ViewKind};
use doc_path::DocPath;
use serde_json::Value;

pub use descriptor::{apply_order, decode_order};
pub use rule::{
    BindingSource, FixedLeafRule, LeafBinding, ListingRule, Render, RewriteRule, Selection,
    ViewSelector,
};

/// Read-only view of the installed snapshot handed to rewriters.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    snapshot: Arc<Snapshot>,
}

impl RewriteContext {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn view(&self, kind: ViewKind) -> &FlatFieldMap {
        self.snapshot.views.view(kind)
    }

    pub fn dataset_value(&self, path: &DocPath) -> Option<&Value> {
        doc_path::get(&self.snapshot.document, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub body: String,
    /// Leaves overwritten from the snapshot.
    pub written: usize,
}

impl RewriteRule {
    pub fn rewrite(&self, body: &str, ctx: &RewriteContext) -> Result<Rewritten, RewriteError> {
        let mut doc: Value = serde_json::from_str(body)?;
        if !(doc.is_object() || doc.is_array()) {
            return Err(RewriteError::Shape("top-level value is not a container".to_string()));
        }
        let written = match self {
            Self::Listing(rule) => listing::apply(rule, &mut doc, ctx)?,
            Self::FixedLeaf(rule) => fixed_leaf::apply(rule, &mut doc, ctx)?,
        };
        Ok(Rewritten {
            body: serde_json::to_string(&doc)?,
            written,
        })
    }
}
