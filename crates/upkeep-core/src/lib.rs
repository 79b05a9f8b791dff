//! upkeep-core - guards and the gated dependency upgrade pipeline
//!
//! Provides:
//! - a bounded settlement guard for detached `cargo` workers
//! - the working-tree gate and the git operations the pipeline needs
//! - dependency snapshots and the advisory diff report
//! - the two-stage (update, then upgrade) pipeline, gated by a [`Validator`]

pub mod cargo;
mod command;
pub mod config;
pub mod error;
pub mod fakes;
pub mod git;
pub mod pipeline;
pub mod process;
pub mod snapshot;
pub mod telemetry;

pub use cargo::{CargoCli, PackageManager};
pub use config::UpkeepConfig;
pub use error::{Result, UpkeepError, FATAL_EXIT_CODE};
pub use git::{assert_clean, CleanScope, GitCli, StatusEntry, Vcs};
pub use pipeline::{
    PipelineReport, PipelineRun, PipelineStage, UpgradePipeline, Validator,
    UPDATE_COMMIT_MESSAGE, UPGRADE_COMMIT_MESSAGE,
};
pub use process::{PgrepInspector, ProcessInfo, ProcessInspector, SettlementGuard};
pub use snapshot::{DependencySnapshot, SnapshotName, SnapshotReport, SnapshotStore};
pub use telemetry::init_tracing;
