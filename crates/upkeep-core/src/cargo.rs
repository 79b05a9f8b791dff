//! Package-manager operations the pipeline drives.

use crate::command::run_tool;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// The three package-manager operations the upgrade pipeline needs.
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Write every resolved dependency into `dest`.
    async fn materialize(&self, dest: &Path) -> Result<()>;

    /// Re-resolve within the existing manifest constraints (lockfile only).
    async fn update(&self) -> Result<()>;

    /// Relax manifest constraints to the newest allowed versions.
    async fn upgrade(&self) -> Result<()>;
}

/// [`PackageManager`] backed by `cargo`, `cargo vendor` and cargo-edit's
/// `cargo upgrade`.
#[derive(Debug, Clone)]
pub struct CargoCli {
    workspace_root: PathBuf,
}

impl CargoCli {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }
}

#[async_trait]
impl PackageManager for CargoCli {
    async fn materialize(&self, dest: &Path) -> Result<()> {
        info!(dest = %dest.display(), "cargo vendor");
        let mut args: Vec<std::ffi::OsString> = vec![
            "vendor".into(),
            "--quiet".into(),
            "--versioned-dirs".into(),
        ];
        args.push(dest.as_os_str().to_os_string());
        run_tool("cargo", args, &self.workspace_root).await.map(|_| ())
    }

    async fn update(&self) -> Result<()> {
        info!("cargo update");
        run_tool("cargo", ["update"], &self.workspace_root)
            .await
            .map(|_| ())
    }

    async fn upgrade(&self) -> Result<()> {
        info!("cargo upgrade --incompatible");
        run_tool("cargo", ["upgrade", "--incompatible"], &self.workspace_root)
            .await
            .map(|_| ())
    }
}
