// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! Spawning, stopping, and stream-forwarding for one embedded collector
//! child process.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid as NixPid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{info, warn};

use nrdot_types::collector::ExitCause;

use crate::error::SupervisorError;

/// Everything needed to spawn one collector instance.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Path to the embedded collector binary.
    pub binary_path: PathBuf,
    /// Path of the rendered descriptor to pass as an argument.
    pub descriptor_path: PathBuf,
    /// Environment variables identifying this instance to the child
    /// (generation, fingerprint, and similar identity fields).
    pub env: Vec<(String, String)>,
}

/// A running child process plus the metadata the rest of the supervisor
/// needs to track it.
pub struct RunningChild {
    child: Child,
    /// OS process id.
    pub pid: u32,
    /// Process-group id. Since the child is made a session leader via
    /// `setsid` before exec, this always equals `pid`.
    pub pgid: u32,
}

/// Spawns `spec` in its own process group (via `setsid`, executed between
/// fork and exec) with piped stdout/stderr, and starts two background tasks
/// that forward each stream's lines into the tracing log at the
/// appropriate severity (stdout at `info`, stderr at `warn`) — the "child
/// process protocol" contract.
pub fn spawn(spec: &SpawnSpec) -> Result<RunningChild, SupervisorError> {
    let mut command = Command::new(&spec.binary_path);
    command
        .arg(&spec.descriptor_path)
        .envs(spec.env.iter().map(|(k, v)| (k.clone(), v.clone())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null());

    // Safety: the closure only calls an async-signal-safe syscall
    // (`setsid`) between fork and exec, as required by `pre_exec`'s
    // contract.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            Ok(())
        });
    }

    let mut child = command
        .spawn()
        .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;

    let pid = child.id().ok_or_else(|| SupervisorError::SpawnFailed("child exited before its pid could be read".to_string()))?;
    let pgid = pid;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, pid, false));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, pid, true));
    }

    info!(pid, pgid, binary = %spec.binary_path.display(), "spawned collector subprocess");
    Ok(RunningChild { child, pid, pgid })
}

async fn forward_lines<R>(reader: R, pid: u32, is_stderr: bool)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if is_stderr {
                    warn!(pid, collector_stream = "stderr", "{line}");
                } else {
                    info!(pid, collector_stream = "stdout", "{line}");
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(pid, error = %e, "error reading collector output stream");
                break;
            }
        }
    }
}

/// Sends the terminate signal to the whole process group and waits up to
/// `shutdown_deadline` for exit; escalates to `SIGKILL` on timeout.
/// Returns the cause the caller should record against the instance.
pub async fn stop(running: &mut RunningChild, shutdown_deadline: Duration) -> ExitCause {
    if let Err(e) = killpg(NixPid::from_raw(running.pgid as i32), Signal::SIGTERM) {
        warn!(pgid = running.pgid, error = %e, "failed to send SIGTERM to process group, attempting direct kill");
        let _ = running.child.start_kill();
    }

    match timeout(shutdown_deadline, running.child.wait()).await {
        Ok(Ok(status)) => ExitCause::Exited { code: status.code() },
        Ok(Err(_)) => ExitCause::Lost,
        Err(_) => {
            warn!(pgid = running.pgid, "shutdown deadline exceeded, killing process group");
            let _ = killpg(NixPid::from_raw(running.pgid as i32), Signal::SIGKILL);
            let _ = running.child.wait().await;
            ExitCause::Killed
        }
    }
}

/// Polls whether the child has exited without blocking, for the
/// supervisor's control loop to detect an unexpected exit between health
/// checks.
pub fn poll_exit(running: &mut RunningChild) -> Option<ExitCause> {
    match running.child.try_wait() {
        Ok(Some(status)) => Some(ExitCause::Exited { code: status.code() }),
        Ok(None) => None,
        Err(_) => Some(ExitCause::Lost),
    }
}

/// Immediately kills the process group, for startup reconciliation against
/// an orphaned child found from a prior supervisor run.
pub fn kill_process_group(pgid: u32) -> Result<(), SupervisorError> {
    killpg(NixPid::from_raw(pgid as i32), Signal::SIGKILL).map_err(|source| SupervisorError::SignalFailed { pgid, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_true_and_observe_clean_exit() {
        let spec = SpawnSpec {
            binary_path: PathBuf::from("/bin/true"),
            descriptor_path: PathBuf::from("/dev/null"),
            env: vec![],
        };
        let mut running = spawn(&spec).expect("spawning /bin/true should succeed");
        assert_eq!(running.pgid, running.pid);

        let status = tokio::time::timeout(Duration::from_secs(5), running.child.wait())
            .await
            .expect("process should exit quickly")
            .expect("wait should succeed");
        assert!(status.success());
    }

    #[tokio::test]
    async fn stop_escalates_to_kill_when_process_ignores_sigterm() {
        let spec = SpawnSpec {
            binary_path: PathBuf::from("/bin/sh"),
            descriptor_path: PathBuf::from("/dev/null"),
            env: vec![],
        };
        let mut command = Command::new(&spec.binary_path);
        command
            .arg("-c")
            .arg("trap '' TERM; sleep 30")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .stdin(Stdio::null());
        unsafe {
            command.pre_exec(|| nix::unistd::setsid().map(|_| ()).map_err(std::io::Error::from));
        }
        let child = command.spawn().expect("spawning /bin/sh should succeed");
        let pid = child.id().unwrap();
        let mut running = RunningChild { child, pid, pgid: pid };

        let cause = stop(&mut running, Duration::from_millis(200)).await;
        assert_eq!(cause, ExitCause::Killed);
    }
}
