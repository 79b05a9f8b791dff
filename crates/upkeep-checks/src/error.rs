//! Error types for the validation suite

use crate::consistency::ConsistencyReport;
use std::path::PathBuf;
use thiserror::Error;
use upkeep_core::{UpkeepError, FATAL_EXIT_CODE};

#[derive(Error, Debug)]
pub enum SuiteError {
    /// Name not in the registry
    #[error("Unknown test {0}")]
    UnknownCheck(String),

    /// The tool behind a check is not installed
    #[error("check '{check}': {tool} is not installed or not in PATH")]
    ToolUnavailable { check: String, tool: String },

    /// The tool ran and failed
    #[error("check '{check}' failed with exit code {exit_code}")]
    CheckFailed { check: String, exit_code: i32 },

    /// Registry, aggregate and CI workflows disagree
    #[error("check registry is inconsistent:\n{0}")]
    Consistency(ConsistencyReport),

    /// A CI workflow file could not be read
    #[error("cannot read CI workflow {}: {reason}", .path.display())]
    Workflow { path: PathBuf, reason: String },

    /// Registry definition error
    #[error("invalid check registry: {0}")]
    InvalidRegistry(String),

    #[error(transparent)]
    Core(#[from] UpkeepError),
}

impl SuiteError {
    /// Process exit status: a failing check's own status, 9 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            SuiteError::CheckFailed { exit_code, .. } => u8::try_from(*exit_code)
                .ok()
                .filter(|c| *c != 0)
                .unwrap_or(1),
            _ => FATAL_EXIT_CODE,
        }
    }
}

/// Result type for suite operations
pub type Result<T> = std::result::Result<T, SuiteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_check_message_and_status() {
        let err = SuiteError::UnknownCheck("lint".to_string());
        assert_eq!(err.to_string(), "Unknown test lint");
        assert_eq!(err.exit_code(), 9);
    }

    #[test]
    fn failed_check_propagates_status() {
        let err = SuiteError::CheckFailed {
            check: "clippy".to_string(),
            exit_code: 101,
        };
        assert_eq!(err.exit_code(), 101);

        let killed = SuiteError::CheckFailed {
            check: "test".to_string(),
            exit_code: -1,
        };
        assert_eq!(killed.exit_code(), 1);
    }

    #[test]
    fn unavailable_tool_differs_from_unknown_check() {
        let err = SuiteError::ToolUnavailable {
            check: "links".to_string(),
            tool: "lychee".to_string(),
        };
        assert!(!err.to_string().contains("Unknown test"));
        assert_eq!(err.exit_code(), 9);
    }
}
