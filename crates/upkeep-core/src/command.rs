//! Awaited invocation of external tools.

use crate::error::{Result, UpkeepError};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a successful tool run.
#[derive(Debug, Clone)]
pub(crate) struct ToolOutput {
    pub stdout: String,
}

/// Run `program` in `cwd` to completion.
///
/// A missing executable is `ToolUnavailable`; a non-zero exit is `ToolFailed`.
/// No timeout is applied.
pub(crate) async fn run_tool<I, S>(program: &str, args: I, cwd: &Path) -> Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    let display_args = args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");

    if !cwd.is_dir() {
        return Err(UpkeepError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("working directory not found: {}", cwd.display()),
        )));
    }

    debug!(tool = program, args = %display_args, "running tool");

    let output = Command::new(program)
        .args(&args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => UpkeepError::ToolUnavailable {
                tool: program.to_string(),
            },
            _ => UpkeepError::Io(e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(UpkeepError::ToolFailed {
            tool: program.to_string(),
            args: display_args,
            exit_code: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
    })
}
