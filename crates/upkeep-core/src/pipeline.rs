//! Gated dependency upgrade pipeline.
//!
//! Two mutation stages, each committed on its own so the risky half can be
//! reverted alone:
//!
//! 1. minor update: re-resolve the lockfile within existing constraints
//! 2. major upgrade: relax manifest constraints to the newest versions
//!
//! A stage commits only when its diff is non-empty and the validator's
//! aggregate check passes. Any failure aborts the run; nothing is retried
//! except the settlement poll, and nothing is reverted.

use crate::cargo::PackageManager;
use crate::config::UpkeepConfig;
use crate::error::{Result, UpkeepError};
use crate::git::{assert_clean, CleanScope, Vcs};
use crate::process::{ProcessInspector, SettlementGuard};
use crate::snapshot::{SnapshotName, SnapshotReport, SnapshotStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Commit message for the minor-update stage.
pub const UPDATE_COMMIT_MESSAGE: &str = "cargo update";

/// Commit message for the major-upgrade stage.
pub const UPGRADE_COMMIT_MESSAGE: &str = "cargo upgrade";

/// Runs the aggregate check that gates every commit.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self) -> anyhow::Result<()>;
}

/// Where a [`PipelineRun`] currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    SnapshotBefore,
    MinorUpdate,
    MajorUpgrade,
    Report,
    Done,
}

/// One execution of the pipeline. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub stage: PipelineStage,
    pub unpushed_commit_count_before: u64,
    /// Whether each snapshot was captured in this run.
    pub snapshots: BTreeMap<SnapshotName, bool>,
    /// Messages of the commits this run created, oldest first.
    pub commits: Vec<String>,
}

impl PipelineRun {
    fn new(unpushed_commit_count_before: u64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            stage: PipelineStage::Start,
            unpushed_commit_count_before,
            snapshots: SnapshotName::ALL.iter().map(|n| (*n, false)).collect(),
            commits: Vec::new(),
        }
    }

    fn advance(&mut self, stage: PipelineStage) {
        info!(run_id = %self.run_id, from = ?self.stage, to = ?stage, "stage transition");
        self.stage = stage;
    }
}

/// Final output of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run: PipelineRun,
    pub snapshots: SnapshotReport,
    pub unpushed_commit_count_after: u64,
    /// `git status` lines still present after both stages, e.g. a member
    /// manifest rewritten by `cargo upgrade` outside the configured ones.
    pub leftover_changes: Vec<String>,
}

impl PipelineReport {
    /// New unpushed commits since the run started.
    pub fn commit_delta(&self) -> i64 {
        self.unpushed_commit_count_after as i64 - self.run.unpushed_commit_count_before as i64
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.snapshots)?;
        writeln!(
            f,
            "Unpushed commits: {} before, {} now ({:+})",
            self.run.unpushed_commit_count_before,
            self.unpushed_commit_count_after,
            self.commit_delta()
        )?;
        if !self.leftover_changes.is_empty() {
            writeln!(f, "Uncommitted changes left in the working tree:")?;
            for entry in &self.leftover_changes {
                writeln!(f, "  {entry}")?;
            }
        }
        if self.run.commits.is_empty() {
            if self.leftover_changes.is_empty() {
                writeln!(f, "Dependencies already up to date; nothing committed.")
            } else {
                writeln!(f, "Nothing committed; inspect the changes above.")
            }
        } else {
            for msg in &self.run.commits {
                writeln!(f, "  committed: {msg}")?;
            }
            writeln!(f, "Review the new commits, then push.")
        }
    }
}

/// The dependency upgrade orchestrator.
pub struct UpgradePipeline {
    config: UpkeepConfig,
    vcs: Arc<dyn Vcs>,
    package_manager: Arc<dyn PackageManager>,
    guard: SettlementGuard,
    validator: Arc<dyn Validator>,
    snapshots: SnapshotStore,
}

impl UpgradePipeline {
    pub fn new(
        config: UpkeepConfig,
        vcs: Arc<dyn Vcs>,
        package_manager: Arc<dyn PackageManager>,
        inspector: Arc<dyn ProcessInspector>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        let guard = SettlementGuard::from_config(inspector, &config);
        let snapshots = SnapshotStore::new(
            config.resolve(&config.snapshot_root),
            config.resolve(&config.lockfile),
        );
        Self {
            config,
            vcs,
            package_manager,
            guard,
            validator,
            snapshots,
        }
    }

    /// Run both stages and report.
    pub async fn run(&self) -> Result<PipelineReport> {
        assert_clean(self.vcs.as_ref(), None, CleanScope::Everything).await?;
        self.guard.settle().await?;

        let mut run = PipelineRun::new(self.vcs.unpushed_commit_count().await?);
        info!(
            run_id = %run.run_id,
            unpushed = run.unpushed_commit_count_before,
            "starting dependency upgrade"
        );

        self.snapshots.clear_stale()?;
        run.advance(PipelineStage::SnapshotBefore);
        self.capture(&mut run, SnapshotName::Before).await?;

        run.advance(PipelineStage::MinorUpdate);
        self.minor_update(&mut run).await?;

        run.advance(PipelineStage::MajorUpgrade);
        self.major_upgrade(&mut run).await?;

        run.advance(PipelineStage::Report);
        let leftover_changes: Vec<String> = self
            .vcs
            .status(None)
            .await?
            .iter()
            .map(|e| e.to_string())
            .collect();
        if !leftover_changes.is_empty() {
            warn!(
                run_id = %run.run_id,
                entries = ?leftover_changes,
                "working tree is dirty after the upgrade stages"
            );
        }
        let snapshots = self.snapshots.report()?;
        let unpushed_commit_count_after = self.vcs.unpushed_commit_count().await?;

        run.advance(PipelineStage::Done);
        Ok(PipelineReport {
            run,
            snapshots,
            unpushed_commit_count_after,
            leftover_changes,
        })
    }

    async fn minor_update(&self, run: &mut PipelineRun) -> Result<()> {
        self.package_manager.update().await?;
        self.guard.settle().await?;

        let lockfile = vec![self.config.lockfile.clone()];
        if !self.changed(&lockfile).await? {
            info!("lockfile unchanged; skipping update commit");
            return Ok(());
        }

        self.commit_validated(run, UPDATE_COMMIT_MESSAGE, &lockfile)
            .await?;
        self.capture(run, SnapshotName::AfterUpdate).await
    }

    async fn major_upgrade(&self, run: &mut PipelineRun) -> Result<()> {
        self.package_manager.upgrade().await?;
        self.guard.settle().await?;

        if !self.changed(&self.config.manifests).await? {
            info!("manifests unchanged; skipping upgrade commit");
            return Ok(());
        }

        let mut paths = self.config.manifests.clone();
        paths.push(self.config.lockfile.clone());
        self.commit_validated(run, UPGRADE_COMMIT_MESSAGE, &paths)
            .await?;
        self.capture(run, SnapshotName::AfterUpgrade).await
    }

    /// Stage `paths`, run the validator, commit, then wait for settlement.
    ///
    /// On validation failure the paths are unstaged again and left modified.
    async fn commit_validated(
        &self,
        run: &mut PipelineRun,
        message: &str,
        paths: &[PathBuf],
    ) -> Result<()> {
        self.vcs.stage(paths).await?;

        if let Err(e) = self.validator.validate().await {
            warn!(run_id = %run.run_id, stage = message, error = %e, "validation failed");
            self.vcs.unstage(paths).await?;
            return Err(UpkeepError::ValidationFailed {
                stage: message.to_string(),
                reason: format!("{e:#}"),
            });
        }

        self.vcs.commit(message).await?;
        run.commits.push(message.to_string());
        info!(run_id = %run.run_id, commit = message, "committed");

        self.guard.settle().await
    }

    async fn changed(&self, paths: &[PathBuf]) -> Result<bool> {
        for path in paths {
            if !self.vcs.status(Some(path)).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn capture(&self, run: &mut PipelineRun, name: SnapshotName) -> Result<()> {
        self.snapshots
            .capture(self.package_manager.as_ref(), name)
            .await?;
        run.snapshots.insert(name, true);
        Ok(())
    }
}
