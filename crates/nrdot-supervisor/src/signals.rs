// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Unix signal handling: `SIGHUP` triggers a reload from on-disk
//! configuration; `SIGTERM`/`SIGINT` trigger graceful shutdown.

use tokio::signal::unix::{signal, SignalKind};

/// What the supervisor's control loop should do in response to a delivered
/// signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorSignal {
    /// `SIGHUP`: reload from on-disk configuration.
    Reload,
    /// `SIGTERM` or `SIGINT`: stop the active collector and exit.
    Shutdown,
}

/// Listens for `SIGHUP`, `SIGTERM`, and `SIGINT` and resolves to whichever
/// arrives first. Intended to be called in a loop from the control loop's
/// `select!` alongside health-check ticks and reload requests.
pub async fn next_signal() -> std::io::Result<SupervisorSignal> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = hangup.recv() => Ok(SupervisorSignal::Reload),
        _ = terminate.recv() => Ok(SupervisorSignal::Shutdown),
        _ = interrupt.recv() => Ok(SupervisorSignal::Shutdown),
    }
}
