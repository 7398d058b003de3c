use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dataset_provider::{ProviderConfig, RemoteConfig};
use derived_views::RatioConfig;
use serde::Deserialize;
use traffic_router::EndpointRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceMode {
    Fixture,
    Remote,
}

#[derive(Debug, Clone)]
pub(crate) struct SourceConfig {
    pub(crate) mode: SourceMode,
    pub(crate) remote: RemoteConfig,
    pub(crate) fixture_path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Fixture,
            remote: RemoteConfig::default(),
            fixture_path: PathBuf::from("fixtures/dataset.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OverlayConfig {
    pub(crate) bind: SocketAddr,
    pub(crate) source: SourceConfig,
    pub(crate) provider: ProviderConfig,
    pub(crate) store_path: PathBuf,
    pub(crate) endpoints: Vec<EndpointRule>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            source: SourceConfig::default(),
            provider: ProviderConfig::default(),
            store_path: PathBuf::from("datasets/overlay_cache.json"),
            endpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct OverlayFile {
    server: Option<ServerSection>,
    source: Option<SourceSection>,
    cache: Option<CacheSection>,
    ratios: Option<RatioSection>,
    endpoint: Option<Vec<toml::Value>>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerSection {
    bind: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceSection {
    mode: Option<String>,
    base_url: Option<String>,
    data_path: Option<String>,
    timeout_ms: Option<u64>,
    fixture_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheSection {
    retention_ms: Option<u64>,
    store_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RatioSection {
    ratio_a: Option<f64>,
    ratio_b: Option<f64>,
}

pub(crate) fn overlay_config_path() -> PathBuf {
    std::env::var("OVERLAY_CONFIG_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("configs/overlay.toml"))
}

pub(crate) fn load_overlay_config() -> OverlayConfig {
    load_overlay_config_from(&overlay_config_path())
}

pub(crate) fn load_overlay_config_from(path: &Path) -> OverlayConfig {
    let Ok(raw) = fs::read_to_string(path) else {
        tracing::warn!(path = %path.display(), "overlay config not found; using defaults");
        return OverlayConfig::default();
    };
    parse_overlay_config(&raw)
}

pub(crate) fn parse_overlay_config(raw: &str) -> OverlayConfig {
    let parsed = match toml::from_str::<OverlayFile>(raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(?err, "overlay config unreadable; using defaults");
            return OverlayConfig::default();
        }
    };
    let mut cfg = OverlayConfig::default();

    if let Some(bind) = parsed.server.and_then(|s| s.bind) {
        match bind.parse() {
            Ok(addr) => cfg.bind = addr,
            Err(err) => tracing::warn!(?err, %bind, "invalid server.bind ignored"),
        }
    }

    if let Some(section) = parsed.source {
        if let Some(v) = section.mode {
            match v.trim().to_ascii_lowercase().as_str() {
                "fixture" => cfg.source.mode = SourceMode::Fixture,
                "remote" => cfg.source.mode = SourceMode::Remote,
                other => tracing::warn!(mode = %other, "unknown source.mode ignored"),
            }
        }
        if let Some(v) = section.base_url.filter(|v| !v.trim().is_empty()) {
            cfg.source.remote.base_url = v;
        }
        if let Some(v) = section.data_path.filter(|v| !v.trim().is_empty()) {
            cfg.source.remote.data_path = v;
        }
        if let Some(v) = section.timeout_ms {
            cfg.source.remote.timeout = Duration::from_millis(v.max(100));
        }
        if let Some(v) = section.fixture_path.filter(|v| !v.trim().is_empty()) {
            cfg.source.fixture_path = PathBuf::from(v);
        }
    }

    if let Some(section) = parsed.cache {
        if let Some(v) = section.retention_ms {
            cfg.provider.retention = Duration::from_millis(v.max(1_000));
        }
        if let Some(v) = section.store_path.filter(|v| !v.trim().is_empty()) {
            cfg.store_path = PathBuf::from(v);
        }
    }

    if let Some(section) = parsed.ratios {
        cfg.provider.ratios = RatioConfig {
            ratio_a: valid_ratio(section.ratio_a).unwrap_or(cfg.provider.ratios.ratio_a),
            ratio_b: valid_ratio(section.ratio_b).unwrap_or(cfg.provider.ratios.ratio_b),
        };
    }

    cfg.endpoints = parsed
        .endpoint
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(idx, raw)| match EndpointRule::deserialize(raw) {
            Ok(rule) => Some(rule),
            Err(err) => {
                tracing::warn!(?err, index = idx, "invalid endpoint entry skipped");
                None
            }
        })
        .collect();
    cfg
}

fn valid_ratio(v: Option<f64>) -> Option<f64> {
    v.filter(|r| r.is_finite() && *r >= 0.0)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use response_rewrite::RewriteRule;

    use super::*;

    const SAMPLE: &str = r#"
[server]
bind = "0.0.0.0:9100"

[source]
mode = "remote"
base_url = "http://data.internal/api/"
timeout_ms = 5

[cache]
retention_ms = 60000
store_path = "var/cache.json"

[ratios]
ratio_a = 0.25
ratio_b = -1.0

[[endpoint]]
name = "group report"
signature = "GroupReportService.List"
kind = "listing"

[[endpoint]]
name = "broken"
signature = "Nope"
kind = "does_not_exist"

[[endpoint]]
name = "summary"
signature = "SummaryService.Get"
kind = "fixed_leaf"
zero_fill = ["1"]
bindings = [
  { path = "1.2", source = { from = "view", view = "base", field = "stats.cost" }, render = "text" },
]
"#;

    #[test]
    fn sections_override_defaults() {
        let cfg = parse_overlay_config(SAMPLE);
        assert_eq!(cfg.bind, "0.0.0.0:9100".parse::<SocketAddr>().expect("addr"));
        assert_eq!(cfg.source.mode, SourceMode::Remote);
        assert_eq!(cfg.source.remote.base_url, "http://data.internal/api/");
        assert_eq!(cfg.source.remote.data_path, "/dataset");
        assert_eq!(cfg.source.remote.timeout, Duration::from_millis(100));
        assert_eq!(cfg.provider.retention, Duration::from_millis(60_000));
        assert_eq!(cfg.store_path, PathBuf::from("var/cache.json"));
        assert_eq!(cfg.provider.ratios.ratio_a, 0.25);
        assert_eq!(cfg.provider.ratios.ratio_b, 0.7);
    }

    #[test]
    fn invalid_endpoint_is_skipped_and_order_is_kept() {
        let cfg = parse_overlay_config(SAMPLE);
        let names: Vec<_> = cfg.endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["group report", "summary"]);
        assert!(matches!(cfg.endpoints[0].rule, RewriteRule::Listing(_)));
        match &cfg.endpoints[1].rule {
            RewriteRule::FixedLeaf(rule) => assert_eq!(rule.bindings.len(), 1),
            other => panic!("unexpected rule {other:?}"),
        }
    }

    #[test]
    fn unreadable_or_missing_file_falls_back_to_defaults() {
        let cfg = parse_overlay_config("[source\nmode = ");
        assert_eq!(cfg.source.mode, SourceMode::Fixture);
        assert!(cfg.endpoints.is_empty());

        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_overlay_config_from(&dir.path().join("missing.toml"));
        assert_eq!(cfg.store_path, PathBuf::from("datasets/overlay_cache.json"));
    }

    #[test]
    fn file_on_disk_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        file.write_all(b"[source]\nfixture_path = \"alt/data.json\"\n").expect("write");
        let cfg = load_overlay_config_from(file.path());
        assert_eq!(cfg.source.fixture_path, PathBuf::from("alt/data.json"));
    }

    #[test]
    fn shipped_config_parses() {
        let raw = include_str!("../../../configs/overlay.toml");
        let cfg = parse_overlay_config(raw);
        assert!(!cfg.endpoints.is_empty());
    }
}
