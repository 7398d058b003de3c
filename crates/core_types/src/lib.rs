use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Dataset cache key. Two keys are equal only when both strings match
/// literally; `2024-10-01` and `2024-10-1` are different ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeKey {
    pub start: String,
    pub end: String,
}

impl RangeKey {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl fmt::Display for RangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Optional identifiers forwarded to the remote source. Never part of the
/// cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeIds {
    #[serde(default)]
    pub ocid: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub ad_group_id: Option<String>,
    #[serde(default)]
    pub ad_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParams {
    pub range: RangeKey,
    #[serde(default)]
    pub scope: ScopeIds,
}

impl RequestParams {
    pub fn new(range: RangeKey) -> Self {
        Self {
            range,
            scope: ScopeIds::default(),
        }
    }
}

/// The canonical dataset for one time range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(rename = "accountCost", default)]
    pub account: Map<String, Value>,
    #[serde(rename = "campaignCost", default)]
    pub campaigns: Vec<Value>,
    #[serde(rename = "adGroupCost", default)]
    pub ad_groups: Vec<Value>,
    #[serde(rename = "adCost", default)]
    pub ads: Vec<Value>,
    #[serde(rename = "audiencesCost", default)]
    pub audiences: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bill: Option<Map<String, Value>>,
    #[serde(rename = "accountCostChart", default)]
    pub chart: Vec<Value>,
    /// Collections this system does not interpret, kept for dataset lookups.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Dataset {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Dotted field name (`stats.clicks`) to scalar value.
pub type FlatFieldMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Base,
    RatioA,
    RatioB,
}

/// All three flat maps, always projected from the same dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedViews {
    pub base: FlatFieldMap,
    pub ratio_a: FlatFieldMap,
    pub ratio_b: FlatFieldMap,
}

impl DerivedViews {
    pub fn view(&self, kind: ViewKind) -> &FlatFieldMap {
        match kind {
            ViewKind::Base => &self.base,
            ViewKind::RatioA => &self.ratio_a,
            ViewKind::RatioB => &self.ratio_b,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }
}

/// One installed cache entry. Built whole and published behind an `Arc`;
/// never mutated after construction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub range: RangeKey,
    pub dataset: Arc<Dataset>,
    /// `dataset` as a JSON document, for dotted lookups by rewriters.
    pub document: Value,
    pub views: DerivedViews,
    pub fetched_at_ms: i64,
    pub expires_at_ms: i64,
}

impl Snapshot {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Durable form of a snapshot; views are recomputed on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDataset {
    pub range: RangeKey,
    pub dataset: Dataset,
    pub fetched_at_ms: i64,
    pub expires_at_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RequestBody {
    #[default]
    Empty,
    /// Already-decoded multipart or urlencoded form fields.
    Form(Vec<(String, String)>),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptedRequest {
    #[serde(default)]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub body: RequestBody,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptedResponse {
    pub url: String,
    #[serde(default = "default_status")]
    pub status: u16,
    pub body: String,
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("remote request failed: {0}")]
    Network(String),
    #[error("remote returned status {0}")]
    Status(u16),
    #[error("dataset body unparsable: {0}")]
    Decode(String),
    #[error("fixture unavailable: {0}")]
    Fixture(String),
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("response body is not json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unexpected document shape: {0}")]
    Shape(String),
    #[error(transparent)]
    Path(#[from] PathError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encode: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("missing intermediate key `{key}` at depth {depth}")]
    MissingIntermediate { key: String, depth: usize },
    #[error("index {index} out of bounds (len {len}) at depth {depth}")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        depth: usize,
    },
    #[error("cannot step into scalar at depth {depth}")]
    NotAContainer { depth: usize },
    #[error("empty path")]
    Empty,
}

/// Where the canonical dataset comes from. Exactly one implementation is
/// active per running instance.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn fetch(&self, params: &RequestParams) -> Result<Dataset, FetchError>;

    fn name(&self) -> &'static str;
}

/// Persistence across restarts. Failures are reported as `false` / `None`
/// and never surface as errors.
pub trait DurableStore: Send + Sync {
    fn save(&self, entry: &StoredDataset) -> bool;
    fn load(&self) -> Option<StoredDataset>;
    fn clear(&self);
}
