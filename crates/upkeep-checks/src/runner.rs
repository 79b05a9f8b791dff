//! Execution of tool-backed checks.

use crate::error::{Result, SuiteError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;
use upkeep_core::UpkeepError;

/// Result of a tool execution.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Check name.
    pub stage_name: String,

    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout (empty when output is inherited).
    pub stdout: String,

    /// Captured stderr (empty when output is inherited).
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl StageResult {
    /// Whether this stage passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the command behind a check.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run `command` for check `name` to completion.
    ///
    /// A missing executable is `ToolUnavailable`; a non-zero exit is a
    /// normal result, not an error.
    async fn execute(&self, name: &str, command: &[String]) -> Result<StageResult>;
}

/// Where tool output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Stream straight to the operator's terminal.
    Inherit,
    /// Capture into [`StageResult`].
    Capture,
}

/// [`ToolExecutor`] that spawns real processes in the workspace root.
///
/// `cargo <sub>` commands are checked against `cargo --list` first: cargo
/// itself is always on PATH, so a missing `cargo-audit` would otherwise
/// surface as a failing check with status 101.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    workspace_root: PathBuf,
    output: OutputMode,
    cargo_commands: Arc<OnceCell<HashSet<String>>>,
}

impl ProcessExecutor {
    pub fn new(workspace_root: impl Into<PathBuf>, output: OutputMode) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            output,
            cargo_commands: Arc::new(OnceCell::new()),
        }
    }

    /// Fail with `ToolUnavailable` when `cargo <sub>` names a subcommand
    /// that is not installed. Toolchain overrides (`+nightly`) and flags
    /// are left to cargo.
    async fn ensure_cargo_subcommand(&self, check: &str, args: &[String]) -> Result<()> {
        let Some(sub) = args
            .first()
            .filter(|a| !a.starts_with('-') && !a.starts_with('+'))
        else {
            return Ok(());
        };

        let known = self
            .cargo_commands
            .get_or_try_init(|| self.list_cargo_commands(check))
            .await?;
        if known.contains(sub.as_str()) {
            return Ok(());
        }
        Err(SuiteError::ToolUnavailable {
            check: check.to_string(),
            tool: format!("cargo-{sub}"),
        })
    }

    async fn list_cargo_commands(&self, check: &str) -> Result<HashSet<String>> {
        let output = Command::new("cargo")
            .arg("--list")
            .current_dir(&self.workspace_root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SuiteError::ToolUnavailable {
                    check: check.to_string(),
                    tool: "cargo".to_string(),
                },
                _ => SuiteError::Core(e.into()),
            })?;

        if !output.status.success() {
            return Err(SuiteError::Core(UpkeepError::ToolFailed {
                tool: "cargo".to_string(),
                args: "--list".to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }));
        }

        let commands = parse_cargo_list(&String::from_utf8_lossy(&output.stdout));
        debug!(count = commands.len(), "cargo subcommands");
        Ok(commands)
    }
}

/// Subcommand names from `cargo --list`: the first word of every indented
/// line, aliases included.
fn parse_cargo_list(stdout: &str) -> HashSet<String> {
    stdout
        .lines()
        .filter(|line| line.starts_with(char::is_whitespace))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl ToolExecutor for ProcessExecutor {
    async fn execute(&self, name: &str, command: &[String]) -> Result<StageResult> {
        let start = Instant::now();

        let Some((exe, args)) = command.split_first() else {
            return Err(SuiteError::InvalidRegistry(format!(
                "check {name} has an empty command"
            )));
        };

        if !self.workspace_root.is_dir() {
            return Err(SuiteError::Core(
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("workspace not found: {}", self.workspace_root.display()),
                )
                .into(),
            ));
        }

        if exe == "cargo" {
            self.ensure_cargo_subcommand(name, args).await?;
        }

        debug!(check = name, command = %command.join(" "), "spawning tool");

        let (stdout, stderr) = match self.output {
            OutputMode::Inherit => (Stdio::inherit(), Stdio::inherit()),
            OutputMode::Capture => (Stdio::piped(), Stdio::piped()),
        };

        let child = Command::new(exe)
            .args(args)
            .current_dir(&self.workspace_root)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SuiteError::ToolUnavailable {
                    check: name.to_string(),
                    tool: exe.clone(),
                },
                _ => SuiteError::Core(e.into()),
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SuiteError::Core(e.into()))?;

        Ok(StageResult {
            stage_name: name.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stage_result_passed() {
        let result = StageResult {
            stage_name: "fmt".to_string(),
            exit_code: 0,
            stdout: "".to_string(),
            stderr: "".to_string(),
            duration_ms: 100,
        };
        assert!(result.passed());
    }

    #[test]
    fn test_stage_result_failed() {
        let result = StageResult {
            stage_name: "fmt".to_string(),
            exit_code: 1,
            stdout: "".to_string(),
            stderr: "error".to_string(),
            duration_ms: 100,
        };
        assert!(!result.passed());
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessExecutor::new(dir.path(), OutputMode::Capture);

        let result = executor
            .execute("echo_test", &argv(&["echo", "hello"]))
            .await
            .expect("execute failed");
        assert!(result.passed());
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessExecutor::new(dir.path(), OutputMode::Capture);

        let result = executor
            .execute("false_test", &argv(&["false"]))
            .await
            .expect("execute failed");
        assert!(!result.passed());
        assert_ne!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessExecutor::new(dir.path(), OutputMode::Capture);

        let err = executor
            .execute("links", &argv(&["no-such-linkchecker-9000", "."]))
            .await
            .unwrap_err();
        match err {
            SuiteError::ToolUnavailable { check, tool } => {
                assert_eq!(check, "links");
                assert_eq!(tool, "no-such-linkchecker-9000");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_cargo_list() {
        let listing = "Installed Commands:\n    audit                Audit Cargo.lock\n    b                    alias: build\n    build                Compile a local package\n    fmt\n";
        let commands = parse_cargo_list(listing);
        assert!(commands.contains("audit"));
        assert!(commands.contains("b"));
        assert!(commands.contains("fmt"));
        assert!(!commands.contains("Installed"));
        assert!(!commands.contains("machete"));
    }

    #[tokio::test]
    async fn test_missing_cargo_subcommand_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessExecutor::new(dir.path(), OutputMode::Capture);

        let err = executor
            .execute("audit", &argv(&["cargo", "no-such-subcmd-xyz"]))
            .await
            .unwrap_err();
        match &err {
            SuiteError::ToolUnavailable { check, tool } => {
                assert_eq!(check, "audit");
                assert_eq!(tool, "cargo-no-such-subcmd-xyz");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.exit_code(), 9);
    }

    #[tokio::test]
    async fn test_builtin_cargo_subcommand_runs() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessExecutor::new(dir.path(), OutputMode::Capture);

        let result = executor
            .execute("version", &argv(&["cargo", "version"]))
            .await
            .expect("execute failed");
        assert!(result.passed());
        assert!(result.stdout.contains("cargo"));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessExecutor::new(dir.path(), OutputMode::Capture);
        assert!(executor.execute("empty", &[]).await.is_err());
    }
}
