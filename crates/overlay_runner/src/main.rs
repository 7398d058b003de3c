mod config_loader;
mod http_api;

use std::sync::Arc;

use anyhow::{Context, Result};
use core_types::DatasetSource;
use dataset_provider::{DatasetProvider, FileStore, FixtureSource, RemoteSource};
use infra_clock::{Clock, WallClock};
use observability::{init_metrics, init_tracing};
use traffic_router::{InterceptionHook, RouteTable};

use crate::config_loader::{load_overlay_config, OverlayConfig, SourceMode};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_tracing("overlay_runner");
    let prometheus = init_metrics().context("metrics recorder already installed")?;

    let cfg = load_overlay_config();
    let hook = build_hook(&cfg);
    hook.provider().warm_from_store();
    tracing::info!(
        source = hook.provider().source_name(),
        endpoints = hook.dispatcher().table().len(),
        "overlay ready"
    );

    let app = http_api::build_router(http_api::AppState { hook, prometheus });
    tracing::info!(addr = %cfg.bind, "overlay api started");
    axum::serve(tokio::net::TcpListener::bind(cfg.bind).await?, app).await?;
    Ok(())
}

fn build_source(cfg: &OverlayConfig) -> Arc<dyn DatasetSource> {
    match cfg.source.mode {
        SourceMode::Fixture => Arc::new(FixtureSource::new(cfg.source.fixture_path.clone())),
        SourceMode::Remote => Arc::new(RemoteSource::new(cfg.source.remote.clone())),
    }
}

fn build_hook(cfg: &OverlayConfig) -> InterceptionHook {
    let clock: Arc<dyn Clock> = Arc::new(WallClock::default());
    let store = Arc::new(FileStore::new(cfg.store_path.clone(), clock.clone()));
    let provider = DatasetProvider::new(build_source(cfg), store, clock, cfg.provider);
    let table = Arc::new(RouteTable::new(cfg.endpoints.clone()));
    InterceptionHook::new(provider, table, tokio::runtime::Handle::current())
}
