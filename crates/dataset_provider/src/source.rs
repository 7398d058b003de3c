use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use core_types::{Dataset, DatasetSource, FetchError, RequestParams};
use reqwest::Client;
use tokio::sync::OnceCell;

/// Static dataset file. The file is not range-sensitive, so it is read once
/// and every later range is served from memory. A failed read is retried on
/// the next fetch.
pub struct FixtureSource {
    path: PathBuf,
    cell: OnceCell<Dataset>,
    reads: AtomicUsize,
}

impl FixtureSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cell: OnceCell::new(),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    async fn read_fixture(&self) -> Result<Dataset, FetchError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|err| FetchError::Fixture(format!("{}: {err}", self.path.display())))?;
        let dataset = Dataset::from_json_str(&raw).map_err(|err| FetchError::Decode(err.to_string()))?;
        tracing::info!(
            path = %self.path.display(),
            campaigns = dataset.campaigns.len(),
            ads = dataset.ads.len(),
            audiences = dataset.audiences.len(),
            "fixture dataset loaded"
        );
        Ok(dataset)
    }
}

#[async_trait]
impl DatasetSource for FixtureSource {
    async fn fetch(&self, _params: &RequestParams) -> Result<Dataset, FetchError> {
        self.cell
            .get_or_try_init(|| self.read_fixture())
            .await
            .cloned()
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub data_path: String,
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000/api".to_string(),
            data_path: "/dataset".to_string(),
            timeout: Duration::from_millis(10_000),
        }
    }
}

pub struct RemoteSource {
    http: Client,
    cfg: RemoteConfig,
}

impl RemoteSource {
    pub fn new(cfg: RemoteConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.cfg.base_url.trim_end_matches('/'),
            self.cfg.data_path
        )
    }
}

fn query_pairs(params: &RequestParams) -> [(&'static str, &str); 6] {
    let scope = &params.scope;
    [
        ("cost_time_start", params.range.start.as_str()),
        ("cost_time_end", params.range.end.as_str()),
        ("ocid", scope.ocid.as_deref().unwrap_or_default()),
        ("campaignId", scope.campaign_id.as_deref().unwrap_or_default()),
        ("adGroupId", scope.ad_group_id.as_deref().unwrap_or_default()),
        ("adId", scope.ad_id.as_deref().unwrap_or_default()),
    ]
}

#[async_trait]
impl DatasetSource for RemoteSource {
    async fn fetch(&self, params: &RequestParams) -> Result<Dataset, FetchError> {
        let res = self
            .http
            .get(self.endpoint())
            .query(&query_pairs(params))
            .timeout(self.cfg.timeout)
            .send()
            .await
            .map_err(|err| FetchError::Network(err.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = res
            .text()
            .await
            .map_err(|err| FetchError::Network(err.to_string()))?;
        Dataset::from_json_str(&body).map_err(|err| FetchError::Decode(err.to_string()))
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
