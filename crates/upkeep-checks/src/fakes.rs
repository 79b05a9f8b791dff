//! Test doubles for the suite (testing only)

use crate::error::Result;
use crate::runner::{StageResult, ToolExecutor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// One recorded tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub check: String,
    pub command: Vec<String>,
}

/// Records invocations instead of spawning processes.
///
/// Every check exits 0 unless scripted otherwise with [`fail_with`].
///
/// [`fail_with`]: RecordingExecutor::fail_with
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    exit_codes: HashMap<String, i32>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `check` exit with `exit_code`.
    pub fn fail_with(mut self, check: impl Into<String>, exit_code: i32) -> Self {
        self.exit_codes.insert(check.into(), exit_code);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of the checks invoked so far, in order.
    pub fn invoked(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.check).collect()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, name: &str, command: &[String]) -> Result<StageResult> {
        self.calls.lock().unwrap().push(RecordedCall {
            check: name.to_string(),
            command: command.to_vec(),
        });
        Ok(StageResult {
            stage_name: name.to_string(),
            exit_code: self.exit_codes.get(name).copied().unwrap_or(0),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
        })
    }
}
