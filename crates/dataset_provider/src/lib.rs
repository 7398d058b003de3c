//! Canonical dataset cache with single-flight loading.
//!
//! The installed [`Snapshot`] is swapped whole behind a lock, and its derived
//! views are projected before the swap, so a reader never sees a dataset
//! next to views from another fetch.

pub mod source;
pub mod store;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use core_types::{
    Dataset, DatasetSource, DurableStore, FetchError, RangeKey, RequestParams, Snapshot,
    StoredDataset,
};
use derived_views::{project, RatioConfig};
use futures::future::{BoxFuture, FutureExt, Shared};
use infra_clock::{duration_to_ms, Clock};
use parking_lot::{Mutex, RwLock};

pub use source::{FixtureSource, RemoteConfig, RemoteSource};
pub use store::{FileStore, MemoryStore};

type InflightFetch = Shared<BoxFuture<'static, Result<Arc<Snapshot>, FetchError>>>;

#[derive(Debug, Clone, Copy)]
pub struct ProviderConfig {
    pub retention: Duration,
    pub ratios: RatioConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            ratios: RatioConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct DatasetProvider {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn DatasetSource>,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    cfg: ProviderConfig,
    current: RwLock<Option<Arc<Snapshot>>>,
    inflight: Mutex<HashMap<RangeKey, InflightFetch>>,
    fetches: AtomicU64,
}

impl DatasetProvider {
    pub fn new(
        source: Arc<dyn DatasetSource>,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
        cfg: ProviderConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                clock,
                cfg,
                current: RwLock::new(None),
                inflight: Mutex::new(HashMap::new()),
                fetches: AtomicU64::new(0),
            }),
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.inner.source.name()
    }

    /// Returns the snapshot for `params.range`, fetching it if the installed
    /// one is for another range or has expired. Concurrent callers for the
    /// same range share one fetch. The fetch is spawned, so it runs to
    /// completion even if every caller goes away.
    pub async fn ensure_loaded(&self, params: &RequestParams) -> Result<Arc<Snapshot>, FetchError> {
        if let Some(snap) = self.cached_for(&params.range) {
            return Ok(snap);
        }

        let fetch = {
            let mut inflight = self.inner.inflight.lock();
            // a fetch may have installed between the check above and the lock
            if let Some(snap) = self.cached_for(&params.range) {
                return Ok(snap);
            }
            inflight
                .entry(params.range.clone())
                .or_insert_with(|| {
                    let fut = self.inner.clone().load(params.clone()).boxed().shared();
                    tokio::spawn(fut.clone());
                    fut
                })
                .clone()
        };

        fetch.await
    }

    /// The installed snapshot, if it has not expired. An expired snapshot is
    /// dropped here.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.inner.current()
    }

    /// Installs a still-valid persisted dataset. Returns whether one was found.
    pub fn warm_from_store(&self) -> bool {
        let Some(entry) = self.inner.store.load() else {
            return false;
        };
        tracing::info!(range = %entry.range, "dataset restored from store");
        self.inner.install(
            entry.range,
            entry.dataset,
            entry.fetched_at_ms,
            entry.expires_at_ms,
        );
        true
    }

    pub fn clear(&self) {
        *self.inner.current.write() = None;
        self.inner.store.clear();
        tracing::info!("dataset cache cleared");
    }

    /// Number of source fetches started since construction.
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::Relaxed)
    }

    fn cached_for(&self, range: &RangeKey) -> Option<Arc<Snapshot>> {
        self.current().filter(|snap| &snap.range == range)
    }
}

impl Inner {
    fn current(&self) -> Option<Arc<Snapshot>> {
        let snap = self.current.read().clone()?;
        if !snap.is_expired(self.clock.now_ms()) {
            return Some(snap);
        }
        let mut slot = self.current.write();
        if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, &snap)) {
            *slot = None;
            tracing::info!(range = %snap.range, "cached dataset expired");
        }
        None
    }

    async fn load(self: Arc<Self>, params: RequestParams) -> Result<Arc<Snapshot>, FetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::info!(range = %params.range, source = self.source.name(), "fetching dataset");

        let result = match self.source.fetch(&params).await {
            Ok(dataset) => {
                let fetched_at_ms = self.clock.now_ms();
                let expires_at_ms =
                    fetched_at_ms.saturating_add(duration_to_ms(self.cfg.retention));
                let snap = self.install(params.range.clone(), dataset, fetched_at_ms, expires_at_ms);
                self.persist(&snap);
                metrics::counter!("overlay.fetch.ok").increment(1);
                Ok(snap)
            }
            Err(err) => {
                metrics::counter!("overlay.fetch.error").increment(1);
                tracing::warn!(?err, range = %params.range, "dataset fetch failed; keeping previous dataset");
                Err(err)
            }
        };

        self.inflight.lock().remove(&params.range);
        result
    }

    fn install(
        &self,
        range: RangeKey,
        dataset: Dataset,
        fetched_at_ms: i64,
        expires_at_ms: i64,
    ) -> Arc<Snapshot> {
        let views = project(&dataset, &self.cfg.ratios);
        let document = dataset.to_document();
        let snap = Arc::new(Snapshot {
            range,
            dataset: Arc::new(dataset),
            document,
            views,
            fetched_at_ms,
            expires_at_ms,
        });
        *self.current.write() = Some(snap.clone());
        snap
    }

    fn persist(&self, snap: &Snapshot) {
        let entry = StoredDataset {
            range: snap.range.clone(),
            dataset: (*snap.dataset).clone(),
            fetched_at_ms: snap.fetched_at_ms,
            expires_at_ms: snap.expires_at_ms,
        };
        if !self.store.save(&entry) {
            tracing::warn!(range = %snap.range, "dataset installed but not persisted");
        }
    }
}
