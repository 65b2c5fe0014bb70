// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `nrdot`: the single-binary host telemetry collector.
//!
//! Wires the discovery, configuration, supervision, and control-API
//! crates together into three subcommands:
//!
//! - `nrdot run` (the default): renders the on-disk configuration,
//!   starts the embedded collector under supervision, and serves the
//!   loopback control API until a shutdown signal arrives.
//! - `nrdot validate <file>`: renders a configuration document without
//!   starting anything, for CI and pre-deploy checks.
//! - `nrdot discover`: runs a single discovery pass and prints the
//!   result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nrdot_api::state::ConfigSource;
use nrdot_api::AppState;
use nrdot_config::ConfigEngine;
use nrdot_discovery::DiscoveryConfig;
use nrdot_supervisor::{
    BackoffConfig, CollectorBinaryConfig, DescriptorStore, HealthCheckConfig, MemoryCeilingConfig, ReloadConfig, RestartPolicy, Supervisor,
    SupervisorConfig, SupervisorSignal,
};

/// Default loopback bind address for the control API, overridable with
/// `NRDOT_API_BIND`. The port is otherwise unclaimed in the IANA registry.
const DEFAULT_API_BIND: &str = "127.0.0.1:4320";

/// Default location of the embedded collector binary, overridable with
/// `NRDOT_COLLECTOR_BINARY`. Packaging drops the wrapped OpenTelemetry
/// collector here alongside `nrdot` itself; there is no configuration
/// schema field for it since it describes the deployment, not the
/// pipeline.
const DEFAULT_COLLECTOR_BINARY: &str = "/opt/nrdot/otelcol";

#[derive(Parser, Debug)]
#[command(name = "nrdot", version, about = "Single-binary host telemetry collector")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the user configuration document.
    #[arg(long, global = true, default_value = "/etc/nrdot/config.yaml")]
    config: PathBuf,

    /// Directory for rendered descriptors, rollback history, and other
    /// runtime state.
    #[arg(long, global = true, default_value = "/var/lib/nrdot")]
    state_dir: PathBuf,

    /// Log verbosity, passed through to `tracing_subscriber`'s
    /// `EnvFilter` (e.g. `info`, `debug`, `nrdot_supervisor=trace,info`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the supervisor and control API (default).
    Run,
    /// Render `file` against current discovery and exit without starting
    /// a collector.
    Validate {
        /// Configuration document to validate.
        file: PathBuf,
    },
    /// Run one discovery pass and print the result.
    Discover,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn discovery_config_default() -> DiscoveryConfig {
    DiscoveryConfig::default()
}

fn supervisor_config_default() -> SupervisorConfig {
    let binary_path = std::env::var("NRDOT_COLLECTOR_BINARY").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_COLLECTOR_BINARY));

    SupervisorConfig {
        binary: CollectorBinaryConfig { binary_path, active_health_port: 13_133, candidate_health_port: 13_134 },
        health_check: HealthCheckConfig::default(),
        restart_policy: RestartPolicy::default(),
        backoff: BackoffConfig::default(),
        max_retries: 10,
        restart_budget_refill_interval: Duration::from_secs(60),
        reload: ReloadConfig::default(),
        memory_ceiling: MemoryCeilingConfig::default(),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let command = cli.command.unwrap_or(Command::Run);
    match command {
        Command::Validate { file } => run_validate(&file),
        Command::Discover => run_discover().await,
        Command::Run => run_supervisor(&cli.config, &cli.state_dir).await,
    }
}

#[allow(clippy::print_stdout)]
fn run_validate(file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;

    match ConfigEngine::validate_only(&raw) {
        Ok(warnings) => {
            for w in &warnings {
                warn!(field = %w.field, message = %w.message, "configuration warning");
            }
            println!("configuration is valid ({} warning(s))", warnings.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("configuration is invalid: {e}");
            if let nrdot_config::ConfigError::Multiple(errors) = &e {
                for err in errors {
                    eprintln!("  - {err}");
                }
            }
            std::process::exit(1);
        }
    }
}

#[allow(clippy::print_stdout)]
async fn run_discover() -> anyhow::Result<()> {
    let config = discovery_config_default();
    let result = nrdot_discovery::discover(&config, None).await;

    for err in &result.errors {
        warn!(scanner = err.scanner, message = %err.message, "discovery scanner failed");
    }

    #[derive(serde::Serialize)]
    struct Output {
        services: Vec<nrdot_types::ServiceFact>,
        errors: Vec<String>,
    }

    let output = Output { services: result.services, errors: result.errors.iter().map(std::string::ToString::to_string).collect() };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_supervisor(config_path: &Path, state_dir: &Path) -> anyhow::Result<()> {
    let discovery_config = discovery_config_default();

    std::fs::create_dir_all(state_dir).with_context(|| format!("creating state directory {}", state_dir.display()))?;
    let store = DescriptorStore::new(state_dir).context("opening descriptor store")?;
    let supervisor_config = supervisor_config_default();
    let health_interval = supervisor_config.health_check.interval;
    let mut supervisor = Supervisor::new(supervisor_config, store);
    supervisor.reconcile_startup_orphan();

    let raw_yaml = std::fs::read_to_string(config_path).with_context(|| format!("reading {}", config_path.display()))?;
    let discovery = nrdot_discovery::discover(&discovery_config, None).await;
    for err in &discovery.errors {
        warn!(scanner = err.scanner, message = %err.message, "discovery scanner failed during initial render");
    }

    let mut config_engine = ConfigEngine::new();
    let outcome = config_engine.render(&raw_yaml, &discovery).context("rendering initial configuration")?;
    supervisor.start_initial(&outcome.descriptor).await.context("starting initial collector instance")?;

    let read_only = std::env::var("NRDOT_API_READ_ONLY").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    let bind_addr = std::env::var("NRDOT_API_BIND").unwrap_or_else(|_| DEFAULT_API_BIND.to_string());

    let state = AppState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        read_only,
        config_path.to_path_buf(),
        discovery_config.clone(),
        Duration::from_secs(30),
        supervisor,
        config_engine,
        None,
        None,
    );
    state.set_last_descriptor(outcome.descriptor, ConfigSource::File).await;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let api_state = state.clone();
    let api_bind_addr = bind_addr.clone();
    let api_task = tokio::spawn(async move {
        if let Err(e) = nrdot_api::run(&api_bind_addr, api_state, async { let _ = shutdown_rx.await; }).await {
            error!(error = %e, "control API server exited with an error");
        }
    });
    info!(bind_addr = %bind_addr, read_only, "nrdot started");

    let mut health_ticker = tokio::time::interval(health_interval);
    health_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = health_ticker.tick() => {
                let mut supervisor = state.supervisor().lock().await;
                if let Some(cause) = supervisor.tick().await {
                    warn!(cause = ?cause, "active collector instance exited");
                    if supervisor.should_restart(&cause) {
                        if let Some(descriptor) = state.last_descriptor().await {
                            if let Err(e) = supervisor.restart_active(&descriptor).await {
                                error!(error = %e, "failed to restart collector instance");
                            }
                        }
                    } else {
                        error!("restart budget exhausted or restart policy forbids restart; collector instance remains down");
                    }
                }
            }
            signal = nrdot_supervisor::next_signal() => {
                match signal {
                    Ok(SupervisorSignal::Shutdown) => {
                        info!("shutdown signal received");
                        break;
                    }
                    Ok(SupervisorSignal::Reload) => {
                        info!("SIGHUP received, reloading from on-disk configuration");
                        if let Err(e) = reload_from_disk(&state, config_path).await {
                            error!(error = %e, "reload from disk failed");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "signal handling error");
                    }
                }
            }
        }
    }

    {
        let mut supervisor = state.supervisor().lock().await;
        supervisor.shutdown().await;
    }
    let _ = shutdown_tx.send(());
    let _ = api_task.await;

    Ok(())
}

async fn reload_from_disk(state: &AppState, config_path: &Path) -> anyhow::Result<()> {
    let raw_yaml = tokio::fs::read_to_string(config_path).await.with_context(|| format!("reading {}", config_path.display()))?;

    let discovery = if let Some(cached) = state.discovery_cache().get() {
        cached
    } else {
        let result = nrdot_discovery::discover(state.discovery_config(), None).await;
        state.discovery_cache().put(result.clone());
        result
    };

    let outcome = {
        let mut engine = state.config_engine().lock().await;
        engine.render(&raw_yaml, &discovery).context("rendering reloaded configuration")?
    };

    state.set_last_descriptor(outcome.descriptor.clone(), ConfigSource::File).await;

    let mut supervisor = state.supervisor().lock().await;
    supervisor.reload(&outcome.descriptor, false).await.context("reloading collector instance")?;
    drop(supervisor);

    state.mark_reloaded_now();
    Ok(())
}
