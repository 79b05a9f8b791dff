//! In-memory fakes for the pipeline's external collaborators (testing only)
//!
//! Provides `FakeProcessInspector`, `FakePackageManager` and `FakeValidator`.
//! They pair with a real temporary git repository driven through `GitCli`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cargo::PackageManager;
use crate::error::{Result, UpkeepError};
use crate::pipeline::Validator;
use crate::process::{ProcessInfo, ProcessInspector};

// ---------------------------------------------------------------------------
// FakeProcessInspector
// ---------------------------------------------------------------------------

/// Reports a synthetic `cargo` process for a fixed number of observations.
#[derive(Debug)]
pub struct FakeProcessInspector {
    /// `None` means the process never goes away.
    busy_observations: Option<u32>,
    observations: AtomicU32,
}

impl FakeProcessInspector {
    pub fn idle() -> Self {
        Self::busy_for(0)
    }

    pub fn busy_for(observations: u32) -> Self {
        Self {
            busy_observations: Some(observations),
            observations: AtomicU32::new(0),
        }
    }

    pub fn stuck() -> Self {
        Self {
            busy_observations: None,
            observations: AtomicU32::new(0),
        }
    }

    /// Number of times the process list was inspected.
    pub fn observations(&self) -> u32 {
        self.observations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessInspector for FakeProcessInspector {
    async fn list_matching(&self, pattern: &str) -> Result<Vec<ProcessInfo>> {
        let seen = self.observations.fetch_add(1, Ordering::SeqCst);
        let busy = match self.busy_observations {
            Some(limit) => seen < limit,
            None => true,
        };
        if busy {
            Ok(vec![ProcessInfo {
                pid: 4242,
                command: format!("{pattern} metadata"),
            }])
        } else {
            Ok(Vec::new())
        }
    }
}

// ---------------------------------------------------------------------------
// FakePackageManager
// ---------------------------------------------------------------------------

/// Applies scripted file edits below `root` instead of resolving anything.
#[derive(Debug)]
pub struct FakePackageManager {
    root: PathBuf,
    update_edits: Vec<(PathBuf, String)>,
    upgrade_edits: Vec<(PathBuf, String)>,
    fail_materialize: bool,
    calls: Mutex<Vec<String>>,
}

impl FakePackageManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            update_edits: Vec::new(),
            upgrade_edits: Vec::new(),
            fail_materialize: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Write `contents` to `path` (relative to root) on `update()`.
    pub fn with_update_edit(mut self, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.update_edits.push((path.into(), contents.to_string()));
        self
    }

    /// Write `contents` to `path` (relative to root) on `upgrade()`.
    pub fn with_upgrade_edit(mut self, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.upgrade_edits.push((path.into(), contents.to_string()));
        self
    }

    pub fn failing_materialize(mut self) -> Self {
        self.fail_materialize = true;
        self
    }

    /// Operations invoked so far, e.g. `["materialize:.staging-before", "update"]`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn apply(&self, edits: &[(PathBuf, String)]) -> Result<()> {
        for (path, contents) in edits {
            std::fs::write(self.root.join(path), contents)?;
        }
        Ok(())
    }
}

#[async_trait]
impl PackageManager for FakePackageManager {
    async fn materialize(&self, dest: &Path) -> Result<()> {
        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record(format!("materialize:{label}"));

        if self.fail_materialize {
            return Err(UpkeepError::ToolFailed {
                tool: "cargo".to_string(),
                args: "vendor".to_string(),
                exit_code: 101,
                stderr: "failed to fetch registry index".to_string(),
            });
        }

        let crate_dir = dest.join("serde-1.0.0");
        std::fs::create_dir_all(&crate_dir)?;
        let lock = std::fs::read_to_string(self.root.join("Cargo.lock")).unwrap_or_default();
        std::fs::write(crate_dir.join("lib.rs"), format!("// vendored\n{lock}"))?;
        Ok(())
    }

    async fn update(&self) -> Result<()> {
        self.record("update".to_string());
        self.apply(&self.update_edits)
    }

    async fn upgrade(&self) -> Result<()> {
        self.record("upgrade".to_string());
        self.apply(&self.upgrade_edits)
    }
}

// ---------------------------------------------------------------------------
// FakeValidator
// ---------------------------------------------------------------------------

/// Returns scripted verdicts in order; passes once the script runs out.
#[derive(Debug, Default)]
pub struct FakeValidator {
    verdicts: Mutex<VecDeque<bool>>,
    calls: AtomicU32,
}

impl FakeValidator {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn with_verdicts(verdicts: impl IntoIterator<Item = bool>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into_iter().collect()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Validator for FakeValidator {
    async fn validate(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pass = self.verdicts.lock().unwrap().pop_front().unwrap_or(true);
        if pass {
            Ok(())
        } else {
            anyhow::bail!("check 'clippy' failed with exit code 101")
        }
    }
}
