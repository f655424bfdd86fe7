//! Process lifecycle coordination: kill a client and wait until its processes are gone.
//!
//! Clients release file handles asynchronously after being killed, so instead of sleeping a
//! fixed amount the coordinator polls the process table a bounded number of times.

use crate::models::Platform;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use thiserror::Error;

/// Static per-platform kill configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTarget {
    pub platform: Platform,
    pub process_names: Vec<String>,
    pub max_poll_attempts: u32,
    pub poll_interval: Duration,
}

impl ProcessTarget {
    pub fn new(
        platform: Platform,
        process_names: Vec<String>,
        max_poll_attempts: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            platform,
            process_names,
            max_poll_attempts,
            poll_interval,
        }
    }
}

/// Result of [`ProcessCoordinator::wait_until_gone`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// Processes were still present after the last poll. Callers carry on, but should
    /// surface a warning since files may still be held open.
    TimedOut,
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to terminate {platform} processes: {reason}")]
    KillFailed { platform: Platform, reason: String },

    #[error("Failed to launch {target}: {source}")]
    LaunchFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read/kill access to the OS process list.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTable: Send + Sync {
    /// Force-kill every process matching one of `names`. Returns how many were signalled.
    fn kill_matching(&self, names: &[String]) -> usize;

    /// Whether any process matching one of `names` is alive.
    fn any_running(&self, names: &[String]) -> bool;
}

/// [`ProcessTable`] backed by `sysinfo`.
#[derive(Debug, Default)]
pub struct SysinfoProcessTable;

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self
    }

    fn snapshot() -> System {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        system
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn kill_matching(&self, names: &[String]) -> usize {
        let system = Self::snapshot();
        let mut killed = 0;

        for process in system.processes().values() {
            let name = process.name().to_string_lossy();
            let exe_name = process
                .exe()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned());

            if matches_any(&name, exe_name.as_deref(), names) {
                if process.kill() {
                    killed += 1;
                    tracing::debug!("Killed {} (pid {})", name, process.pid());
                } else {
                    tracing::debug!("Kill signal refused for {} (pid {})", name, process.pid());
                }
            }
        }

        killed
    }

    fn any_running(&self, names: &[String]) -> bool {
        let system = Self::snapshot();
        system.processes().values().any(|process| {
            let name = process.name().to_string_lossy();
            let exe_name = process
                .exe()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned());
            matches_any(&name, exe_name.as_deref(), names)
        })
    }
}

/// Lowercase and drop a trailing `.exe`.
fn normalize(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Linux truncates the kernel process name to 15 bytes, so the executable's file name is
/// checked as well.
fn matches_any(process_name: &str, exe_name: Option<&str>, targets: &[String]) -> bool {
    let process_name = normalize(process_name);
    let exe_name = exe_name.map(normalize);

    targets.iter().map(|t| normalize(t)).any(|target| {
        process_name == target || exe_name.as_deref() == Some(target.as_str())
    })
}

/// Terminates a platform's processes and waits for them to exit.
#[derive(Clone)]
pub struct ProcessCoordinator {
    table: Arc<dyn ProcessTable>,
}

impl ProcessCoordinator {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self { table }
    }

    /// Coordinator over the real OS process list.
    pub fn system() -> Self {
        Self::new(Arc::new(SysinfoProcessTable::new()))
    }

    /// Best-effort kill of every process in `target`. "Not running" is not an error.
    pub fn terminate(&self, target: &ProcessTarget) {
        let killed = self.table.kill_matching(&target.process_names);
        tracing::info!(
            "Sent kill to {} {} process(es) ({})",
            killed,
            target.platform,
            target.process_names.join(", ")
        );
    }

    /// Poll until none of the target processes remain.
    ///
    /// Polls exactly `max_poll_attempts` times (at least once), sleeping `poll_interval`
    /// between polls, and returns [`StopOutcome::TimedOut`] when the budget runs out.
    pub async fn wait_until_gone(&self, target: &ProcessTarget) -> StopOutcome {
        let attempts = target.max_poll_attempts.max(1);

        for attempt in 1..=attempts {
            if !self.table.any_running(&target.process_names) {
                tracing::debug!(
                    "{} processes gone after {} poll(s)",
                    target.platform,
                    attempt
                );
                return StopOutcome::Stopped;
            }
            if attempt < attempts {
                tokio::time::sleep(target.poll_interval).await;
            }
        }

        tracing::warn!(
            "{} processes still running after {} polls",
            target.platform,
            attempts
        );
        StopOutcome::TimedOut
    }

    /// Kill then wait, running the kill off the async worker.
    pub async fn stop(&self, target: &ProcessTarget) -> Result<StopOutcome, ProcessError> {
        let coordinator = self.clone();
        let kill_target = target.clone();

        tokio::task::spawn_blocking(move || coordinator.terminate(&kill_target))
            .await
            .map_err(|e| ProcessError::KillFailed {
                platform: target.platform,
                reason: e.to_string(),
            })?;

        Ok(self.wait_until_gone(target).await)
    }
}
