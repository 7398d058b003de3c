//! URL classification, response dispatch and the host-facing hook.

pub mod hook;

use std::sync::Arc;

use core_types::{InterceptedResponse, Snapshot};
use response_rewrite::{RewriteContext, RewriteRule};
use serde::{Deserialize, Serialize};

pub use hook::{Continue, InterceptionHook};

/// One row of the route table: a URL substring and the rewrite it selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRule {
    pub name: String,
    pub signature: String,
    #[serde(flatten)]
    pub rule: RewriteRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(usize);

/// Ordered `(signature, rule)` table. Signatures may overlap; the first
/// matching row wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<EndpointRule>,
}

impl RouteTable {
    pub fn new(routes: Vec<EndpointRule>) -> Self {
        let routes = routes
            .into_iter()
            .filter(|r| {
                let usable = !r.signature.trim().is_empty();
                if !usable {
                    tracing::warn!(name = %r.name, "endpoint rule without signature skipped");
                }
                usable
            })
            .collect();
        Self { routes }
    }

    pub fn classify(&self, url: &str) -> Option<HandlerId> {
        self.routes
            .iter()
            .position(|r| url.contains(r.signature.as_str()))
            .map(HandlerId)
    }

    pub fn route(&self, id: HandlerId) -> &EndpointRule {
        &self.routes[id.0]
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    table: Arc<RouteTable>,
}

impl Dispatcher {
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Always returns a response to forward: the rewritten one when a route
    /// matches and its rewrite succeeds, otherwise the input untouched.
    pub fn dispatch(&self, resp: InterceptedResponse, snapshot: Option<Arc<Snapshot>>) -> InterceptedResponse {
        let Some(id) = self.table.classify(&resp.url) else {
            metrics::counter!("overlay.dispatch.passthrough").increment(1);
            return resp;
        };
        let route = self.table.route(id);

        if !(200..300).contains(&resp.status) {
            tracing::debug!(route = %route.name, status = resp.status, "non-success response forwarded as is");
            return resp;
        }
        let Some(snapshot) = snapshot else {
            tracing::debug!(route = %route.name, "no dataset installed; response forwarded as is");
            return resp;
        };

        match route.rule.rewrite(&resp.body, &RewriteContext::new(snapshot)) {
            Ok(out) => {
                metrics::counter!("overlay.rewrite.ok").increment(1);
                tracing::debug!(route = %route.name, written = out.written, "response rewritten");
                InterceptedResponse {
                    body: out.body,
                    ..resp
                }
            }
            Err(err) => {
                metrics::counter!("overlay.rewrite.error").increment(1);
                tracing::warn!(?err, route = %route.name, url = %resp.url, "rewrite failed; forwarding original");
                resp
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use core_types::{Dataset, DerivedViews, RangeKey};
    use doc_path::DocPath;
    use response_rewrite::{ListingRule, ViewSelector};
    use serde_json::{json, Value};

    use super::*;

    fn listing(signature: &str, name: &str) -> EndpointRule {
        EndpointRule {
            name: name.to_string(),
            signature: signature.to_string(),
            rule: RewriteRule::Listing(ListingRule {
                documents: Vec::new(),
                rows: DocPath::parse("1"),
                values: DocPath::parse("200.1"),
                descriptor: DocPath::parse("2.2"),
                descriptor_field_key: "3".to_string(),
                view: ViewSelector::default(),
                row_bindings: Vec::new(),
            }),
        }
    }

    fn table() -> Arc<RouteTable> {
        Arc::new(RouteTable::new(vec![
            listing("GroupReportService.List", "group"),
            listing("ReportService.List", "report"),
            listing("   ", "blank"),
        ]))
    }

    fn snapshot() -> Arc<Snapshot> {
        let mut views = DerivedViews::default();
        views.base.insert("stats.clicks".to_string(), json!(4321));
        Arc::new(Snapshot {
            range: RangeKey::new("a", "b"),
            dataset: Arc::new(Dataset::default()),
            document: Value::Null,
            views,
            fetched_at_ms: 0,
            expires_at_ms: i64::MAX,
        })
    }

    fn response(url: &str, body: &str) -> InterceptedResponse {
        InterceptedResponse {
            url: url.to_string(),
            status: 200,
            body: body.to_string(),
        }
    }

    const LISTING: &str = r#"{"1":[{"200":{"1":["1","2"]}}],"2":{"2":[{"3":"stats.clicks"},{"3":"stats.cost"}]}}"#;

    #[test]
    fn first_matching_signature_wins() {
        let t = table();
        assert_eq!(t.len(), 2);
        let id = t.classify("/rpc/GroupReportService.List?x=1").expect("match");
        assert_eq!(t.route(id).name, "group");
        let id = t.classify("/rpc/ReportService.List").expect("match");
        assert_eq!(t.route(id).name, "report");
        assert!(t.classify("/rpc/Unrelated.Get").is_none());
    }

    #[test]
    fn unmatched_response_is_forwarded_byte_identical() {
        let d = Dispatcher::new(table());
        let body = "{ \"1\" :  [1,2 ,3] }\n";
        let out = d.dispatch(response("/static/app.js", body), Some(snapshot()));
        assert_eq!(out.body.as_bytes(), body.as_bytes());
    }

    #[test]
    fn malformed_body_on_matched_route_is_forwarded_unmodified() {
        let d = Dispatcher::new(table());
        let body = ")]}'\n{\"1\":";
        let out = d.dispatch(response("/rpc/ReportService.List", body), Some(snapshot()));
        assert_eq!(out.body, body);
    }

    #[test]
    fn matched_route_without_dataset_passes_through() {
        let d = Dispatcher::new(table());
        let out = d.dispatch(response("/rpc/ReportService.List", LISTING), None);
        assert_eq!(out.body, LISTING);
    }

    #[test]
    fn non_success_status_passes_through() {
        let d = Dispatcher::new(table());
        let mut resp = response("/rpc/ReportService.List", LISTING);
        resp.status = 500;
        assert_eq!(d.dispatch(resp, Some(snapshot())).body, LISTING);
    }

    #[test]
    fn matched_route_is_rewritten() {
        let d = Dispatcher::new(table());
        let out = d.dispatch(response("/rpc/ReportService.List", LISTING), Some(snapshot()));
        let doc: Value = serde_json::from_str(&out.body).expect("json");
        assert_eq!(doc["1"][0]["200"]["1"], json!(["4321", "2"]));
        assert_eq!(out.url, "/rpc/ReportService.List");
    }

    #[test]
    fn endpoint_rule_reads_flattened_kind() {
        let rule: EndpointRule = serde_json::from_value(json!({
            "name": "billing",
            "signature": "SummaryService.Get",
            "kind": "fixed_leaf",
            "zero_fill": ["1"],
            "bindings": []
        }))
        .expect("rule");
        assert!(matches!(rule.rule, RewriteRule::FixedLeaf(ref r) if r.zero_fill.len() == 1));
    }
}
