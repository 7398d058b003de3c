use core_types::{InterceptedRequest, RangeKey, RequestBody, RequestParams, ScopeIds};
use serde_json::Value;
use url::{form_urlencoded, Url};

const FORM_START: &str = "cost_time_start";
const FORM_END: &str = "cost_time_end";
const START_KEYS: [&str; 3] = ["cost_time_start", "startDate", "start"];
const END_KEYS: [&str; 3] = ["cost_time_end", "endDate", "end"];

/// Pulls the reporting range out of a request. Sources are tried in order:
/// form fields, JSON body, URL query. The first source holding both ends
/// wins. Bodies that fail to parse count as "not here".
pub fn extract(req: &InterceptedRequest) -> Option<RequestParams> {
    let range = from_form(req)
        .or_else(|| from_json(&req.body))
        .or_else(|| from_query(&req.url))?;
    Some(RequestParams {
        range,
        scope: scope_ids(&req.url),
    })
}

fn from_form(req: &InterceptedRequest) -> Option<RangeKey> {
    match &req.body {
        RequestBody::Form(fields) => form_range(fields),
        RequestBody::Text(raw) if is_urlencoded(req.content_type.as_deref()) => {
            let fields: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .collect();
            form_range(&fields)
        }
        _ => None,
    }
}

fn form_range(fields: &[(String, String)]) -> Option<RangeKey> {
    let lookup = |name: &str| {
        fields
            .iter()
            .find(|(k, v)| k == name && !v.trim().is_empty())
            .map(|(_, v)| v.clone())
    };
    pair(lookup(FORM_START), lookup(FORM_END))
}

fn is_urlencoded(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        ct.to_ascii_lowercase()
            .starts_with("application/x-www-form-urlencoded")
    })
}

fn from_json(body: &RequestBody) -> Option<RangeKey> {
    let RequestBody::Text(raw) = body else {
        return None;
    };
    let doc = match serde_json::from_str::<Value>(raw) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::trace!(%err, "request body is not json");
            return None;
        }
    };
    let obj = doc.as_object()?;
    let first = |keys: &[&str]| keys.iter().find_map(|k| json_text(obj.get(*k)?));
    pair(first(&START_KEYS[..]), first(&END_KEYS[..]))
}

fn json_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_url(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse("http://localhost/").ok()?.join(raw).ok()
        }
        Err(_) => None,
    }
}

fn query_value(url: &Url, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        url.query_pairs()
            .find(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.into_owned())
    })
}

fn from_query(raw_url: &str) -> Option<RangeKey> {
    let url = parse_url(raw_url)?;
    pair(query_value(&url, &START_KEYS), query_value(&url, &END_KEYS))
}

fn scope_ids(raw_url: &str) -> ScopeIds {
    let Some(url) = parse_url(raw_url) else {
        return ScopeIds::default();
    };
    ScopeIds {
        ocid: query_value(&url, &["ocid"]),
        campaign_id: query_value(&url, &["campaignId"]),
        ad_group_id: query_value(&url, &["adGroupId", "adgroupId"]),
        ad_id: query_value(&url, &["adId"]),
    }
}

fn pair(start: Option<String>, end: Option<String>) -> Option<RangeKey> {
    Some(RangeKey::new(start?, end?))
}
