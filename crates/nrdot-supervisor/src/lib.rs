// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Supervisor: owns the embedded collector subprocess across its whole
//! lifecycle — spawn, health monitoring, restart policy, blue/green
//! reloads, resource accounting, and signal-driven control.
//!
//! `nrdot_types::supervisor::SupervisorState` holds the serializable,
//! testable metadata (which generation is active, the restart budget); this
//! crate adds the OS-level handles (`tokio::process::Child`) that state
//! can't carry, and the orchestration logic that drives both together. The
//! collector binary itself is treated as an opaque child process — this
//! crate spawns it, watches it, and reloads it, but has no knowledge of its
//! internals.

pub mod descriptor_store;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod reload;
pub mod resource;
pub mod restart;
pub mod signals;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use nrdot_types::collector::{CollectorInstance, ExitCause, HealthState};
use nrdot_types::descriptor::PipelineDescriptor;
use nrdot_types::supervisor::SupervisorState;

pub use descriptor_store::DescriptorStore;
pub use error::SupervisorError;
pub use health::HealthCheckConfig;
pub use lifecycle::{RunningChild, SpawnSpec};
pub use reload::{ReloadConfig, ReloadOutcome};
pub use resource::{MemoryCeilingConfig, ResourceTracker};
pub use restart::{BackoffConfig, RestartPolicy};
pub use signals::{next_signal, SupervisorSignal};

/// Where the embedded collector binary lives and which ports its active
/// and candidate instances bind their health endpoints on. Blue/green
/// needs two distinct ports since both instances run concurrently during a
/// reload.
#[derive(Debug, Clone)]
pub struct CollectorBinaryConfig {
    /// Path to the collector executable.
    pub binary_path: PathBuf,
    /// Health port used while an instance is active.
    pub active_health_port: u16,
    /// Health port used while an instance is the blue/green candidate.
    pub candidate_health_port: u16,
}

/// Everything the supervisor needs to run, gathered in one place so the
/// binary crate can build it from parsed configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Where the collector binary is and which ports it uses.
    pub binary: CollectorBinaryConfig,
    /// Health-probe cadence and thresholds.
    pub health_check: HealthCheckConfig,
    /// Restart policy for a crashed/unhealthy active instance.
    pub restart_policy: RestartPolicy,
    /// Exponential backoff between restart attempts.
    pub backoff: BackoffConfig,
    /// Restart-attempt budget parameters.
    pub max_retries: u32,
    /// How often the restart budget refills one token while healthy.
    pub restart_budget_refill_interval: Duration,
    /// Blue/green reload timing.
    pub reload: ReloadConfig,
    /// Optional memory-ceiling enforcement.
    pub memory_ceiling: MemoryCeilingConfig,
}

/// Owns the active (and, mid-reload, candidate) collector instance plus
/// all supervision state.
pub struct Supervisor {
    config: SupervisorConfig,
    store: DescriptorStore,
    state: SupervisorState,
    active_child: Option<RunningChild>,
    candidate_child: Option<RunningChild>,
    http_client: reqwest::Client,
    resource_tracker: ResourceTracker,
}

fn spawn_spec_for(binary: &PathBuf, descriptor_path: &std::path::Path, generation: nrdot_types::descriptor::Generation, health_port: u16) -> SpawnSpec {
    SpawnSpec {
        binary_path: binary.clone(),
        descriptor_path: descriptor_path.to_path_buf(),
        env: vec![
            ("NRDOT_GENERATION".to_string(), generation.to_string()),
            ("NRDOT_HEALTH_PORT".to_string(), health_port.to_string()),
        ],
    }
}

impl Supervisor {
    /// Builds a supervisor with no active instance yet.
    #[must_use]
    pub fn new(config: SupervisorConfig, store: DescriptorStore) -> Self {
        let state = SupervisorState::new(config.max_retries, config.restart_budget_refill_interval);
        Self {
            config,
            store,
            state,
            active_child: None,
            candidate_child: None,
            http_client: reqwest::Client::new(),
            resource_tracker: resource::default_tracker(),
        }
    }

    /// Read-only access to the supervisor's metadata state, for status
    /// reporting.
    #[must_use]
    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// Starts the very first collector instance from `descriptor`. Unlike
    /// `reload`, there is no prior active instance to keep running if the
    /// new one fails to become healthy — the caller gets the failure
    /// directly rather than an `Aborted` outcome.
    pub async fn start_initial(&mut self, descriptor: &PipelineDescriptor) -> Result<(), SupervisorError> {
        let path = self.store.persist(descriptor)?;
        let spec = spawn_spec_for(&self.config.binary.binary_path, &path, descriptor.generation, self.config.binary.active_health_port);
        let running = lifecycle::spawn(&spec)?;

        let mut instance = CollectorInstance::spawned(descriptor.generation, running.pid, running.pgid, Instant::now());
        self.wait_until_healthy(&mut instance, self.config.binary.active_health_port, self.config.reload.candidate_health_deadline)
            .await?;

        let pgid = running.pgid;
        self.active_child = Some(running);
        self.state.active = Some(instance);
        self.state.last_good_fingerprint = Some(descriptor.fingerprint);
        self.store.mark_last_good(descriptor.generation)?;
        self.store.record_active_pgid(pgid)?;
        info!(generation = %descriptor.generation, "initial collector instance healthy and active");
        Ok(())
    }

    /// Startup reconciliation (§4.4): kills any collector process group left
    /// running by a supervisor that crashed or was killed mid-reload,
    /// recorded the last time an instance was promoted to active and never
    /// cleared by a clean shutdown. Must be called, at most once, before the
    /// first `start_initial`/`reload` of a fresh `Supervisor`.
    pub fn reconcile_startup_orphan(&self) {
        if let Some(pgid) = self.store.read_active_pgid() {
            self.reconcile_orphans(&[pgid]);
            self.store.clear_active_pgid();
        }
    }

    async fn wait_until_healthy(&self, instance: &mut CollectorInstance, port: u16, deadline: Duration) -> Result<(), SupervisorError> {
        let deadline_at = Instant::now() + deadline;
        let probe_config = HealthCheckConfig { port, ..self.config.health_check.clone() };
        loop {
            if health::probe_once(&self.http_client, &probe_config).await {
                instance.record_health_success();
                return Ok(());
            }
            instance.record_health_failure(u32::MAX);
            if Instant::now() >= deadline_at {
                return Err(SupervisorError::ReloadFailed {
                    reason: format!("instance did not become healthy within {:?}", deadline),
                });
            }
            tokio::time::sleep(self.config.health_check.probe_deadline).await;
        }
    }

    /// Executes the blue/green reload algorithm against `descriptor`. If no
    /// instance is active yet, this is equivalent to `start_initial`. When
    /// `force` is `true`, a candidate is spawned and promoted even if its
    /// fingerprint matches the active one (the control API's `POST
    /// /v1/reload {"force": true}` path, for picking up side effects of an
    /// unchanged descriptor such as renewed credentials on disk).
    pub async fn reload(&mut self, descriptor: &PipelineDescriptor, force: bool) -> Result<ReloadOutcome, SupervisorError> {
        if self.state.active.is_none() {
            self.start_initial(descriptor).await?;
            return Ok(ReloadOutcome::Promoted {
                generation: descriptor.generation,
                fingerprint: descriptor.fingerprint,
            });
        }

        if !force && self.state.last_good_fingerprint == Some(descriptor.fingerprint) {
            return Ok(ReloadOutcome::NoOpSameFingerprint);
        }

        let path = self.store.persist(descriptor)?;
        let spec = spawn_spec_for(&self.config.binary.binary_path, &path, descriptor.generation, self.config.binary.candidate_health_port);
        let running = match lifecycle::spawn(&spec) {
            Ok(running) => running,
            Err(e) => return Ok(ReloadOutcome::Aborted { reason: e.to_string() }),
        };

        let mut instance = CollectorInstance::spawned(descriptor.generation, running.pid, running.pgid, Instant::now());
        self.candidate_child = Some(running);
        self.state.candidate = Some(instance.clone());

        if let Err(e) = self
            .wait_until_healthy(&mut instance, self.config.binary.candidate_health_port, self.config.reload.candidate_health_deadline)
            .await
        {
            warn!(generation = %descriptor.generation, error = %e, "candidate failed to become healthy, aborting reload");
            if let Some(mut candidate) = self.candidate_child.take() {
                let _ = lifecycle::stop(&mut candidate, self.config.reload.shutdown_deadline).await;
            }
            self.state.candidate = None;
            return Ok(ReloadOutcome::Aborted { reason: e.to_string() });
        }

        // The embedded collector is an opaque child process (see module
        // docs): we have no ingress-quiesce signal to send it, so draining
        // in-flight work is approximated by waiting out the drain deadline
        // before terminating.
        tokio::time::sleep(self.config.reload.drain_deadline).await;

        if let Some(mut outgoing) = self.active_child.take() {
            let cause = lifecycle::stop(&mut outgoing, self.config.reload.shutdown_deadline).await;
            if let Some(previous) = self.state.active.as_mut() {
                previous.health = HealthState::Exited;
                previous.last_exit_cause = Some(cause);
            }
        }

        self.active_child = self.candidate_child.take();
        self.state.active = self.state.candidate.take();
        self.state.last_good_fingerprint = Some(descriptor.fingerprint);
        self.store.mark_last_good(descriptor.generation)?;
        if let Some(active) = &self.active_child {
            self.store.record_active_pgid(active.pgid)?;
        }
        self.resource_tracker.reset();

        info!(generation = %descriptor.generation, fingerprint = %descriptor.fingerprint, "promoted candidate to active");
        Ok(ReloadOutcome::Promoted {
            generation: descriptor.generation,
            fingerprint: descriptor.fingerprint,
        })
    }

    /// One health-check tick against the active instance: probes, updates
    /// its health state, and polls for an unexpected exit. Returns the
    /// active instance's exit cause if it has stopped running (whether
    /// detected via the process handle or via sustained probe failures
    /// that the caller chooses to treat as terminal); the caller decides
    /// whether to restart based on `RestartPolicy`.
    pub async fn tick(&mut self) -> Option<ExitCause> {
        let Some(running) = self.active_child.as_mut() else { return None };

        if let Some(cause) = lifecycle::poll_exit(running) {
            if let Some(active) = self.state.active.as_mut() {
                active.health = HealthState::Exited;
                active.last_exit_cause = Some(cause.clone());
            }
            return Some(cause);
        }

        let probed = health::probe_once(&self.http_client, &self.config.health_check).await;
        if let Some(active) = self.state.active.as_mut() {
            if probed {
                active.record_health_success();
            } else {
                active.record_health_failure(self.config.health_check.failure_threshold);
            }
        }

        if let Ok(rss_bytes) = self.resource_tracker.read_rss_bytes(running.pid) {
            if self.resource_tracker.observe(rss_bytes, &self.config.memory_ceiling, Instant::now()) {
                if let Some(active) = self.state.active.as_mut() {
                    active.last_exit_cause = Some(ExitCause::MemoryCeiling);
                }
                return Some(ExitCause::MemoryCeiling);
            }
        }

        if probed {
            self.state.restart_budget.tick(Instant::now());
        }
        None
    }

    /// Whether the restart policy and remaining budget together allow a
    /// restart attempt right now, given the exit cause just observed.
    #[must_use]
    pub fn should_restart(&mut self, cause: &ExitCause) -> bool {
        let was_failure = !matches!(cause, ExitCause::Terminated);
        if !self.config.restart_policy.should_restart(was_failure) {
            return false;
        }
        self.state.restart_budget.try_consume()
    }

    /// The backoff delay to sleep before the `attempt`-th restart of the
    /// active instance.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.config.backoff.delay_for_attempt(attempt)
    }

    /// Respawns the active instance in place from `descriptor` (the same
    /// generation that just crashed, read back from `last-good` by the
    /// caller) after a crash, waiting for it to become healthy again.
    /// Unlike `reload`, this does not run a candidate alongside anything —
    /// there is nothing left running to keep alive.
    pub async fn restart_active(&mut self, descriptor: &PipelineDescriptor) -> Result<(), SupervisorError> {
        let restart_count = self.state.active.as_ref().map_or(0, |i| i.restart_count);
        self.start_initial(descriptor).await?;
        if let Some(active) = self.state.active.as_mut() {
            active.restart_count = restart_count.saturating_add(1);
        }
        Ok(())
    }

    /// Gracefully stops the active instance (used for `SIGTERM`/`SIGINT`
    /// handling and clean process shutdown).
    pub async fn shutdown(&mut self) {
        if let Some(mut running) = self.active_child.take() {
            let cause = lifecycle::stop(&mut running, self.config.reload.shutdown_deadline).await;
            if let Some(active) = self.state.active.as_mut() {
                active.last_exit_cause = Some(cause);
                active.health = HealthState::Exited;
            }
        }
        self.store.clear_active_pgid();
    }

    /// Kills any process whose pgid is in `orphan_pgids` found on startup
    /// (left behind by a crashed prior supervisor run) that isn't the one
    /// this supervisor is about to adopt.
    pub fn reconcile_orphans(&self, orphan_pgids: &[u32]) {
        for &pgid in orphan_pgids {
            if lifecycle::kill_process_group(pgid).is_ok() {
                warn!(pgid, "killed orphaned collector process group found on startup");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use nrdot_types::descriptor::{Generation, PipelineDescriptor, PipelineKind};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn descriptor(generation: u64) -> PipelineDescriptor {
        PipelineDescriptor::new(BTreeMap::new(), BTreeMap::new(), BTreeMap::new(), BTreeMap::<PipelineKind, _>::new(), Generation(generation))
    }

    fn config_for(port: u16) -> SupervisorConfig {
        SupervisorConfig {
            binary: CollectorBinaryConfig {
                binary_path: PathBuf::from("/bin/sleep"),
                active_health_port: port,
                candidate_health_port: port,
            },
            health_check: HealthCheckConfig {
                interval: Duration::from_millis(20),
                probe_deadline: Duration::from_millis(50),
                failure_threshold: 3,
                port,
            },
            restart_policy: RestartPolicy::OnFailure,
            backoff: BackoffConfig::default(),
            max_retries: 10,
            restart_budget_refill_interval: Duration::from_secs(60),
            reload: ReloadConfig {
                candidate_health_deadline: Duration::from_millis(500),
                drain_deadline: Duration::from_millis(10),
                shutdown_deadline: Duration::from_millis(500),
            },
            memory_ceiling: MemoryCeilingConfig::default(),
        }
    }

    async fn healthy_mock_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn start_initial_spawns_and_promotes_to_active_once_healthy() {
        let mock = healthy_mock_server().await;
        let port = mock.address().port();
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        let mut supervisor = Supervisor::new(config_for(port), store);

        // `start_initial` only waits on the probed health port, not on the
        // child's own liveliness, so `/bin/sleep` rejecting its descriptor
        // path as a bogus duration argument and exiting immediately does
        // not affect this test: the mock server above is what answers the
        // health probe.
        let outcome = supervisor.start_initial(&descriptor(1)).await;
        assert!(outcome.is_ok(), "{outcome:?}");
        assert!(supervisor.state().active.is_some());
        assert_eq!(supervisor.state().last_good_fingerprint, Some(descriptor(1).fingerprint));
    }

    #[tokio::test]
    async fn reload_with_identical_fingerprint_is_a_no_op() {
        let mock = healthy_mock_server().await;
        let port = mock.address().port();
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        let mut supervisor = Supervisor::new(config_for(port), store);

        supervisor.start_initial(&descriptor(1)).await.unwrap();
        let same_content_next_generation = descriptor(2);
        assert_eq!(same_content_next_generation.fingerprint, descriptor(1).fingerprint);

        let outcome = supervisor.reload(&same_content_next_generation, false).await.unwrap();
        assert_eq!(outcome, ReloadOutcome::NoOpSameFingerprint);
    }

    #[tokio::test]
    async fn forced_reload_promotes_a_new_candidate_even_with_an_identical_fingerprint() {
        let mock = healthy_mock_server().await;
        let port = mock.address().port();
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        let mut supervisor = Supervisor::new(config_for(port), store);

        supervisor.start_initial(&descriptor(1)).await.unwrap();
        let same_content_next_generation = descriptor(2);
        assert_eq!(same_content_next_generation.fingerprint, descriptor(1).fingerprint);

        let outcome = supervisor.reload(&same_content_next_generation, true).await.unwrap();
        assert_eq!(
            outcome,
            ReloadOutcome::Promoted {
                generation: Generation(2),
                fingerprint: descriptor(1).fingerprint,
            }
        );
        assert_eq!(supervisor.state().active.as_ref().unwrap().generation, Generation(2));
    }

    #[tokio::test]
    async fn start_initial_reports_failure_when_health_endpoint_never_answers() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        // Port 1 is privileged and never bound in the test sandbox, so
        // every probe fails until the deadline elapses.
        let mut config = config_for(1);
        config.reload.candidate_health_deadline = Duration::from_millis(150);
        config.binary.binary_path = PathBuf::from("/bin/sleep");
        let mut supervisor = Supervisor::new(config, store);

        let outcome = supervisor.start_initial(&descriptor(1)).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn start_initial_records_active_pgid_and_shutdown_clears_it() {
        let mock = healthy_mock_server().await;
        let port = mock.address().port();
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        let store_handle = store.clone();
        let mut supervisor = Supervisor::new(config_for(port), store);

        supervisor.start_initial(&descriptor(1)).await.unwrap();
        assert!(store_handle.read_active_pgid().is_some());

        supervisor.shutdown().await;
        assert!(store_handle.read_active_pgid().is_none());
    }

    #[test]
    fn reconcile_startup_orphan_is_a_no_op_with_no_recorded_pgid() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        let supervisor = Supervisor::new(config_for(0), store);
        supervisor.reconcile_startup_orphan();
    }

    #[test]
    fn should_restart_respects_policy_and_budget() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        let mut config = config_for(0);
        config.restart_policy = RestartPolicy::Never;
        let mut supervisor = Supervisor::new(config, store);
        assert!(!supervisor.should_restart(&ExitCause::Exited { code: Some(1) }));
    }
}
