//! Process settlement guard.
//!
//! `cargo` can leave detached workers behind that keep rewriting the
//! lockfile after the foreground command returns. Any `git status` taken
//! while they run is unreliable, so every mutating step is followed by
//! [`SettlementGuard::await_settlement`], a bounded poll of the process list.

use crate::config::UpkeepConfig;
use crate::error::{Result, UpkeepError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// A live process observed by a [`ProcessInspector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub command: String,
}

/// Lists live processes by name.
#[async_trait]
pub trait ProcessInspector: Send + Sync {
    /// Processes whose name matches `pattern` exactly.
    async fn list_matching(&self, pattern: &str) -> Result<Vec<ProcessInfo>>;
}

/// [`ProcessInspector`] backed by `pgrep -a -x`.
///
/// The current process and its parent are never reported, so running
/// under `cargo run` does not count as an interfering `cargo` instance.
#[derive(Debug, Clone)]
pub struct PgrepInspector {
    ignored_pids: Vec<u32>,
}

impl PgrepInspector {
    pub fn new() -> Self {
        let mut ignored_pids = vec![std::process::id()];
        #[cfg(unix)]
        ignored_pids.push(std::os::unix::process::parent_id());
        Self { ignored_pids }
    }
}

impl Default for PgrepInspector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessInspector for PgrepInspector {
    async fn list_matching(&self, pattern: &str) -> Result<Vec<ProcessInfo>> {
        let output = Command::new("pgrep")
            .args(["-a", "-x", pattern])
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => UpkeepError::ToolUnavailable {
                    tool: "pgrep".to_string(),
                },
                _ => UpkeepError::Io(e),
            })?;

        match output.status.code() {
            // 1 means nothing matched
            Some(1) => Ok(Vec::new()),
            Some(0) => Ok(parse_pgrep(
                &String::from_utf8_lossy(&output.stdout),
                &self.ignored_pids,
            )),
            code => Err(UpkeepError::ToolFailed {
                tool: "pgrep".to_string(),
                args: format!("-a -x {pattern}"),
                exit_code: code.unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

fn parse_pgrep(stdout: &str, ignored_pids: &[u32]) -> Vec<ProcessInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (pid, command) = line.split_once(' ').unwrap_or((line, ""));
            let pid = pid.parse::<u32>().ok()?;
            Some(ProcessInfo {
                pid,
                command: command.to_string(),
            })
        })
        .filter(|p| !ignored_pids.contains(&p.pid))
        .collect()
}

/// Waits until no process matching `pattern` is alive.
pub struct SettlementGuard {
    inspector: Arc<dyn ProcessInspector>,
    pattern: String,
    max_attempts: u32,
    poll_interval: Duration,
}

impl SettlementGuard {
    pub fn new(
        inspector: Arc<dyn ProcessInspector>,
        pattern: impl Into<String>,
        max_attempts: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inspector,
            pattern: pattern.into(),
            max_attempts,
            poll_interval,
        }
    }

    pub fn from_config(inspector: Arc<dyn ProcessInspector>, config: &UpkeepConfig) -> Self {
        Self::new(
            inspector,
            config.settle_pattern.clone(),
            config.settle_max_attempts,
            config.settle_poll_interval(),
        )
    }

    /// Wait with the configured budget.
    pub async fn settle(&self) -> Result<()> {
        self.await_settlement(self.max_attempts, self.poll_interval)
            .await
    }

    /// Poll until the process list shows no match.
    ///
    /// Each observation that still finds a match uses up one attempt; after
    /// `max_attempts` such observations this fails with `Unsettled`. Sleeps a
    /// fixed `poll_interval` between observations.
    pub async fn await_settlement(&self, max_attempts: u32, poll_interval: Duration) -> Result<()> {
        let mut remaining = max_attempts.max(1);

        loop {
            let found = self.inspector.list_matching(&self.pattern).await?;
            if found.is_empty() {
                debug!(pattern = %self.pattern, "no background processes");
                return Ok(());
            }

            remaining -= 1;
            let pids: Vec<u32> = found.iter().map(|p| p.pid).collect();

            if remaining == 0 {
                warn!(pattern = %self.pattern, ?pids, "processes did not settle");
                return Err(UpkeepError::Unsettled {
                    pattern: self.pattern.clone(),
                    attempts: max_attempts.max(1),
                    pids,
                });
            }

            info!(
                pattern = %self.pattern,
                ?pids,
                remaining,
                "waiting for background processes"
            );
            tokio::time::sleep(poll_interval).await;
        }
    }
}
