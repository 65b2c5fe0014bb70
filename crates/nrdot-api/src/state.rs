// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared state for the control HTTP API.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, RwLock};

use nrdot_config::ConfigEngine;
use nrdot_discovery::{DiscoveryCache, DiscoveryConfig};
use nrdot_pipeline::{CapProcessor, RegistryMetrics};
use nrdot_supervisor::Supervisor;
use nrdot_types::descriptor::PipelineDescriptor;
use nrdot_types::descriptor::PipelineKind;

/// Where the last-applied configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded from the on-disk configuration file at startup or reload.
    File,
    /// Applied via `POST /v1/config`.
    Api,
}

impl ConfigSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::File => "file",
            ConfigSource::Api => "api",
        }
    }
}

/// Per-pipeline-kind item counters, updated by the worker loop that drives
/// batches through `nrdot-pipeline`'s registry; read back by `GET
/// /v1/metrics`.
#[derive(Debug, Default)]
pub struct ThroughputCounters {
    metrics: AtomicU64,
    traces: AtomicU64,
    logs: AtomicU64,
}

impl ThroughputCounters {
    /// Adds `n` processed items to the counter for `kind`.
    pub fn record(&self, kind: PipelineKind, n: u64) {
        let counter = match kind {
            PipelineKind::Metrics => &self.metrics,
            PipelineKind::Traces => &self.traces,
            PipelineKind::Logs => &self.logs,
        };
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value for `kind`.
    #[must_use]
    pub fn get(&self, kind: PipelineKind) -> u64 {
        match kind {
            PipelineKind::Metrics => self.metrics.load(Ordering::Relaxed),
            PipelineKind::Traces => self.traces.load(Ordering::Relaxed),
            PipelineKind::Logs => self.logs.load(Ordering::Relaxed),
        }
    }
}

fn unix_secs_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

struct Inner {
    version: String,
    started_at: Instant,
    read_only: bool,
    config_path: PathBuf,
    discovery_config: DiscoveryConfig,
    discovery_cache: DiscoveryCache,
    supervisor: Mutex<Supervisor>,
    config_engine: Mutex<ConfigEngine>,
    last_descriptor: RwLock<Option<PipelineDescriptor>>,
    last_render_unix_secs: AtomicU64,
    last_reload_unix_secs: AtomicU64,
    config_source: RwLock<ConfigSource>,
    registry_metrics: Option<Arc<RegistryMetrics>>,
    cap_processor: Option<Arc<CapProcessor>>,
    throughput: ThroughputCounters,
}

/// Shared state handed to every handler via `axum::extract::State`. Cheap
/// to clone (one `Arc` underneath), matching the admin server's
/// `AppState` pattern.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

impl AppState {
    /// Builds the control API's shared state.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        version: String,
        read_only: bool,
        config_path: PathBuf,
        discovery_config: DiscoveryConfig,
        discovery_cache_ttl: Duration,
        supervisor: Supervisor,
        config_engine: ConfigEngine,
        registry_metrics: Option<Arc<RegistryMetrics>>,
        cap_processor: Option<Arc<CapProcessor>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                version,
                started_at: Instant::now(),
                read_only,
                config_path,
                discovery_config,
                discovery_cache: DiscoveryCache::new(discovery_cache_ttl),
                supervisor: Mutex::new(supervisor),
                config_engine: Mutex::new(config_engine),
                last_descriptor: RwLock::new(None),
                last_render_unix_secs: AtomicU64::new(0),
                last_reload_unix_secs: AtomicU64::new(0),
                config_source: RwLock::new(ConfigSource::File),
                registry_metrics,
                cap_processor,
                throughput: ThroughputCounters::default(),
            }),
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.inner.version
    }

    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    #[must_use]
    pub fn read_only(&self) -> bool {
        self.inner.read_only
    }

    #[must_use]
    pub fn config_path(&self) -> &PathBuf {
        &self.inner.config_path
    }

    #[must_use]
    pub fn discovery_config(&self) -> &DiscoveryConfig {
        &self.inner.discovery_config
    }

    #[must_use]
    pub fn discovery_cache(&self) -> &DiscoveryCache {
        &self.inner.discovery_cache
    }

    pub fn supervisor(&self) -> &Mutex<Supervisor> {
        &self.inner.supervisor
    }

    pub fn config_engine(&self) -> &Mutex<ConfigEngine> {
        &self.inner.config_engine
    }

    pub async fn set_last_descriptor(&self, descriptor: PipelineDescriptor, source: ConfigSource) {
        *self.inner.last_descriptor.write().await = Some(descriptor);
        *self.inner.config_source.write().await = source;
        self.inner.last_render_unix_secs.store(unix_secs_now(), Ordering::Relaxed);
    }

    pub async fn last_descriptor(&self) -> Option<PipelineDescriptor> {
        self.inner.last_descriptor.read().await.clone()
    }

    pub async fn config_source(&self) -> ConfigSource {
        *self.inner.config_source.read().await
    }

    #[must_use]
    pub fn last_render_unix_secs(&self) -> Option<u64> {
        match self.inner.last_render_unix_secs.load(Ordering::Relaxed) {
            0 => None,
            secs => Some(secs),
        }
    }

    pub fn mark_reloaded_now(&self) {
        self.inner.last_reload_unix_secs.store(unix_secs_now(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn last_reload_unix_secs(&self) -> Option<u64> {
        match self.inner.last_reload_unix_secs.load(Ordering::Relaxed) {
            0 => None,
            secs => Some(secs),
        }
    }

    #[must_use]
    pub fn registry_metrics(&self) -> Option<&Arc<RegistryMetrics>> {
        self.inner.registry_metrics.as_ref()
    }

    #[must_use]
    pub fn cap_processor(&self) -> Option<&Arc<CapProcessor>> {
        self.inner.cap_processor.as_ref()
    }

    #[must_use]
    pub fn throughput(&self) -> &ThroughputCounters {
        &self.inner.throughput
    }
}
