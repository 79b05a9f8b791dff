//! Dependency snapshots and the diff reporter.
//!
//! A snapshot is the vendored dependency tree at one pipeline checkpoint,
//! stored in a directory named after the checkpoint. Next to each
//! directory sits `<name>.lock.sha256` with the lockfile digest at capture
//! time.

use crate::cargo::PackageManager;
use crate::error::{Result, UpkeepError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pipeline checkpoints at which a snapshot is taken, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotName {
    Before,
    AfterUpdate,
    AfterUpgrade,
}

impl SnapshotName {
    pub const ALL: [SnapshotName; 3] = [
        SnapshotName::Before,
        SnapshotName::AfterUpdate,
        SnapshotName::AfterUpgrade,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotName::Before => "before",
            SnapshotName::AfterUpdate => "after_update",
            SnapshotName::AfterUpgrade => "after_upgrade",
        }
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured dependency tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySnapshot {
    pub name: SnapshotName,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// SHA-256 of the lockfile when the snapshot was taken.
    pub lock_digest: Option<String>,
}

/// Owns the snapshot directories under one root.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    lockfile: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, lockfile: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lockfile: lockfile.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: SnapshotName) -> PathBuf {
        self.root.join(name.as_str())
    }

    fn digest_path(&self, name: SnapshotName) -> PathBuf {
        self.root.join(format!("{}.lock.sha256", name.as_str()))
    }

    fn staging_path(&self, name: SnapshotName) -> PathBuf {
        self.root.join(format!(".staging-{}", name.as_str()))
    }

    /// Delete snapshots left by earlier runs. Missing ones are fine.
    pub fn clear_stale(&self) -> Result<()> {
        for name in SnapshotName::ALL {
            remove_dir_if_present(&self.path_for(name))?;
            remove_dir_if_present(&self.staging_path(name))?;
            match std::fs::remove_file(self.digest_path(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(root = %self.root.display(), "cleared stale snapshots");
        Ok(())
    }

    /// Materialize the dependency tree and move it to the location for `name`.
    ///
    /// Refuses to overwrite an existing snapshot; not retried on failure.
    pub async fn capture(
        &self,
        package_manager: &dyn PackageManager,
        name: SnapshotName,
    ) -> Result<DependencySnapshot> {
        let dest = self.path_for(name);
        if dest.exists() {
            return Err(UpkeepError::Snapshot {
                name: name.to_string(),
                reason: format!("{} already exists", dest.display()),
            });
        }

        std::fs::create_dir_all(&self.root)?;
        let staging = self.staging_path(name);
        remove_dir_if_present(&staging)?;

        package_manager
            .materialize(&staging)
            .await
            .map_err(|e| UpkeepError::Snapshot {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        std::fs::rename(&staging, &dest)?;

        let lock_digest = match std::fs::read(&self.lockfile) {
            Ok(bytes) => {
                let digest = compute_digest(&bytes);
                std::fs::write(self.digest_path(name), &digest)?;
                Some(digest)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let snapshot = DependencySnapshot {
            name,
            size_bytes: dir_size(&dest)?,
            path: dest,
            lock_digest,
        };
        info!(
            snapshot = %name,
            size_bytes = snapshot.size_bytes,
            "captured dependency snapshot"
        );
        Ok(snapshot)
    }

    /// Snapshots currently on disk, in pipeline order.
    pub fn existing(&self) -> Result<Vec<DependencySnapshot>> {
        let mut found = Vec::new();
        for name in SnapshotName::ALL {
            let path = self.path_for(name);
            if !path.is_dir() {
                continue;
            }
            let lock_digest = std::fs::read_to_string(self.digest_path(name))
                .ok()
                .map(|s| s.trim().to_string());
            found.push(DependencySnapshot {
                name,
                size_bytes: dir_size(&path)?,
                path,
                lock_digest,
            });
        }
        Ok(found)
    }

    /// Sizes of the existing snapshots plus a diff command for each adjacent
    /// pair of them. Nothing is diffed here.
    pub fn report(&self) -> Result<SnapshotReport> {
        let snapshots = self.existing()?;
        let diff_commands = snapshots
            .windows(2)
            .map(|pair| diff_command(&pair[0].path, &pair[1].path))
            .collect();
        Ok(SnapshotReport {
            snapshots,
            diff_commands,
        })
    }
}

/// Advisory output of [`SnapshotStore::report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReport {
    pub snapshots: Vec<DependencySnapshot>,
    pub diff_commands: Vec<String>,
}

impl fmt::Display for SnapshotReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.snapshots.is_empty() {
            return writeln!(f, "No dependency snapshots.");
        }
        writeln!(f, "Dependency snapshots:")?;
        for s in &self.snapshots {
            let digest = s
                .lock_digest
                .as_deref()
                .map(|d| d.get(..12).unwrap_or(d))
                .unwrap_or("-");
            writeln!(
                f,
                "  {:<14} {:>12}  lock {}  {}",
                s.name.as_str(),
                human_size(s.size_bytes),
                digest,
                s.path.display()
            )?;
        }
        if !self.diff_commands.is_empty() {
            writeln!(f, "Review the dependency changes with:")?;
            for cmd in &self.diff_commands {
                writeln!(f, "  {cmd}")?;
            }
        }
        Ok(())
    }
}

fn diff_command(from: &Path, to: &Path) -> String {
    format!(
        "git diff --no-index -- {} {}",
        from.display(),
        to.display()
    )
}

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Total size of regular files below `dir`; symlinks are not followed.
fn dir_size(dir: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.path().symlink_metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else if meta.is_file() {
            total += meta.len();
        }
    }
    Ok(total)
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
