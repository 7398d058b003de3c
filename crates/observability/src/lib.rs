use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global fmt subscriber. Keep the returned guard alive for the
/// life of the process or buffered lines are lost on exit.
pub fn init_tracing(service_name: &str) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{service_name}=info,info")));

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_target(true)
        .try_init()
        .is_ok();

    installed.then_some(guard)
}

/// Installs the prometheus recorder once; later calls return the same handle.
/// `None` when another recorder already owns the global slot.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Some(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    let _ = PROM_HANDLE.set(handle.clone());
    Some(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_metrics_is_idempotent() {
        let a = init_metrics();
        let b = init_metrics();
        assert_eq!(a.is_some(), b.is_some());
    }
}
