//! Runtime configuration, resolved from `UPKEEP_*` environment variables.

use crate::error::{Result, UpkeepError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration shared by the pipeline and the check runner.
///
/// Relative paths are resolved against `workspace_root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpkeepConfig {
    /// Root of the Cargo workspace and git work tree.
    pub workspace_root: PathBuf,

    /// Dependency lockfile mutated by the minor-update stage.
    pub lockfile: PathBuf,

    /// Manifests mutated by the major-upgrade stage.
    pub manifests: Vec<PathBuf>,

    /// Parent directory of the `before`/`after_update`/`after_upgrade` snapshots.
    pub snapshot_root: PathBuf,

    /// Process name the settlement guard waits on.
    pub settle_pattern: String,

    /// Observations before the settlement guard gives up.
    pub settle_max_attempts: u32,

    /// Sleep between settlement observations.
    pub settle_poll_interval_ms: u64,

    /// Directory holding the CI workflow definitions.
    pub workflows_dir: PathBuf,

    /// Command name CI jobs use to invoke the check runner.
    pub runner_command: String,
}

impl Default for UpkeepConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            lockfile: PathBuf::from("Cargo.lock"),
            manifests: vec![PathBuf::from("Cargo.toml")],
            snapshot_root: PathBuf::from("target/dependency-snapshots"),
            settle_pattern: "cargo".to_string(),
            settle_max_attempts: 20,
            settle_poll_interval_ms: 500,
            workflows_dir: PathBuf::from(".github/workflows"),
            runner_command: "upkeep-checks".to_string(),
        }
    }
}

impl UpkeepConfig {
    /// Defaults overlaid with `UPKEEP_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("UPKEEP_WORKSPACE") {
            config.workspace_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("UPKEEP_LOCKFILE") {
            config.lockfile = PathBuf::from(v);
        }
        if let Some(v) = lookup("UPKEEP_MANIFESTS") {
            config.manifests = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(v) = lookup("UPKEEP_SNAPSHOT_ROOT") {
            config.snapshot_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("UPKEEP_SETTLE_PATTERN") {
            config.settle_pattern = v;
        }
        if let Some(v) = lookup("UPKEEP_SETTLE_MAX_ATTEMPTS") {
            config.settle_max_attempts = parse_number("UPKEEP_SETTLE_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("UPKEEP_SETTLE_POLL_MS") {
            config.settle_poll_interval_ms = parse_number("UPKEEP_SETTLE_POLL_MS", &v)?;
        }
        if let Some(v) = lookup("UPKEEP_WORKFLOWS_DIR") {
            config.workflows_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("UPKEEP_RUNNER_COMMAND") {
            config.runner_command = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Replace the workspace root.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.settle_max_attempts == 0 {
            return Err(UpkeepError::Config(
                "settle_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.manifests.is_empty() {
            return Err(UpkeepError::Config(
                "at least one manifest path is required".to_string(),
            ));
        }
        if self.settle_pattern.trim().is_empty() {
            return Err(UpkeepError::Config("settle_pattern is empty".to_string()));
        }
        Ok(())
    }

    pub fn settle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settle_poll_interval_ms)
    }

    /// Resolve a possibly relative path against the workspace root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| UpkeepError::Config(format!("{key} is not a valid number: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = UpkeepConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, UpkeepConfig::default());
        assert_eq!(config.settle_poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = UpkeepConfig::from_lookup(lookup_from(&[
            ("UPKEEP_WORKSPACE", "/srv/app"),
            ("UPKEEP_MANIFESTS", "Cargo.toml, crates/a/Cargo.toml"),
            ("UPKEEP_SETTLE_MAX_ATTEMPTS", "3"),
            ("UPKEEP_SETTLE_POLL_MS", "10"),
            ("UPKEEP_RUNNER_COMMAND", "scripts/checks"),
        ]))
        .unwrap();

        assert_eq!(config.workspace_root, PathBuf::from("/srv/app"));
        assert_eq!(
            config.manifests,
            vec![
                PathBuf::from("Cargo.toml"),
                PathBuf::from("crates/a/Cargo.toml")
            ]
        );
        assert_eq!(config.settle_max_attempts, 3);
        assert_eq!(config.settle_poll_interval_ms, 10);
        assert_eq!(config.runner_command, "scripts/checks");
    }

    #[test]
    fn malformed_number_is_config_error() {
        let err =
            UpkeepConfig::from_lookup(lookup_from(&[("UPKEEP_SETTLE_POLL_MS", "soon")]))
                .unwrap_err();
        assert!(matches!(err, UpkeepError::Config(_)));
    }

    #[test]
    fn zero_attempts_rejected() {
        let err =
            UpkeepConfig::from_lookup(lookup_from(&[("UPKEEP_SETTLE_MAX_ATTEMPTS", "0")]))
                .unwrap_err();
        assert!(err.to_string().contains("settle_max_attempts"));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let config = UpkeepConfig::default().with_workspace_root("/work");
        assert_eq!(
            config.resolve(Path::new("Cargo.lock")),
            PathBuf::from("/work/Cargo.lock")
        );
        assert_eq!(config.resolve(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
    }
}
