//! Error types for upkeep-core

use thiserror::Error;

/// Exit status for every fatal condition.
pub const FATAL_EXIT_CODE: u8 = 9;

/// Errors that abort the upgrade pipeline or one of its guards
#[derive(Error, Debug)]
pub enum UpkeepError {
    /// Uncommitted changes where a clean tree is required
    #[error(
        "working tree is not clean ({scope}):\n  {}\nCommit, stash or remove these changes first",
        .entries.join("\n  ")
    )]
    DirtyWorkingTree { scope: String, entries: Vec<String> },

    /// Background package-manager processes never went away
    #[error(
        "'{pattern}' processes still running after {attempts} checks (pids: {pids:?}); \
         wait for them to finish or kill them, then retry"
    )]
    Unsettled {
        pattern: String,
        attempts: u32,
        pids: Vec<u32>,
    },

    /// External tool is not installed or not in PATH
    #[error("{tool} is not installed or not in PATH")]
    ToolUnavailable { tool: String },

    /// External tool ran and reported failure
    #[error("`{tool} {args}` exited with code {exit_code}: {stderr}")]
    ToolFailed {
        tool: String,
        args: String,
        exit_code: i32,
        stderr: String,
    },

    /// Aggregate check failed after a mutation
    #[error(
        "validation failed after {stage}: {reason}\n\
         The change is left uncommitted in the working tree; fix it and commit manually"
    )]
    ValidationFailed { stage: String, reason: String },

    /// Dependency snapshot could not be captured
    #[error("snapshot '{name}' failed: {reason}")]
    Snapshot { name: String, reason: String },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpkeepError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        FATAL_EXIT_CODE
    }
}

/// Result type for upkeep-core operations
pub type Result<T> = std::result::Result<T, UpkeepError>;
