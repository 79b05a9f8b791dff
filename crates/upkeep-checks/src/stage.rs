//! Builtin check catalogue and tool stage configuration.

use serde::{Deserialize, Serialize};

/// Builtin checks that wrap an external tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCheck {
    /// cargo fmt --all -- --check
    Fmt,

    /// cargo clippy --workspace --all-targets -- -D warnings
    Clippy,

    /// cargo test --workspace
    Test,

    /// cargo doc --workspace --no-deps
    Doc,

    /// cargo audit
    Audit,

    /// cargo machete --fix (rewrites manifests)
    Machete,

    /// lychee --offline .
    Links,
}

impl BuiltinCheck {
    /// Aggregate order.
    pub const ALL: [BuiltinCheck; 7] = [
        BuiltinCheck::Fmt,
        BuiltinCheck::Clippy,
        BuiltinCheck::Test,
        BuiltinCheck::Doc,
        BuiltinCheck::Audit,
        BuiltinCheck::Machete,
        BuiltinCheck::Links,
    ];

    /// Get the check name as passed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinCheck::Fmt => "fmt",
            BuiltinCheck::Clippy => "clippy",
            BuiltinCheck::Test => "test",
            BuiltinCheck::Doc => "doc",
            BuiltinCheck::Audit => "audit",
            BuiltinCheck::Machete => "machete",
            BuiltinCheck::Links => "links",
        }
    }

    /// Get the check's main command.
    pub fn command(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            BuiltinCheck::Fmt => &["cargo", "fmt", "--all", "--", "--check"],
            BuiltinCheck::Clippy => &[
                "cargo",
                "clippy",
                "--workspace",
                "--all-targets",
                "--",
                "-D",
                "warnings",
            ],
            BuiltinCheck::Test => &["cargo", "test", "--workspace"],
            BuiltinCheck::Doc => &["cargo", "doc", "--workspace", "--no-deps"],
            BuiltinCheck::Audit => &["cargo", "audit"],
            BuiltinCheck::Machete => &["cargo", "machete", "--fix"],
            BuiltinCheck::Links => &["lychee", "--offline", "--no-progress", "."],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }

    /// Get the check's auto-repair command (if available).
    pub fn fix_command(&self) -> Option<Vec<String>> {
        match self {
            BuiltinCheck::Fmt => Some(vec![
                "cargo".to_string(),
                "fmt".to_string(),
                "--all".to_string(),
            ]),
            _ => None,
        }
    }

    /// Whether the tool rewrites the manifest, so uncommitted manifest
    /// edits must be protected first.
    pub fn rewrites_manifest(&self) -> bool {
        matches!(self, BuiltinCheck::Machete)
    }
}

/// Configuration for a tool-backed check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Check name.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Optional auto-repair command.
    pub fix_command: Option<Vec<String>>,
}

impl StageConfig {
    /// Create a stage configuration from a builtin check.
    pub fn from_builtin(check: BuiltinCheck) -> Self {
        Self {
            name: check.name().to_string(),
            command: check.command(),
            fix_command: check.fix_command(),
        }
    }

    /// Create a custom stage configuration.
    pub fn custom(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            fix_command: None,
        }
    }

    /// Attach an auto-repair command.
    pub fn with_fix(mut self, fix_command: Vec<String>) -> Self {
        self.fix_command = Some(fix_command);
        self
    }

    /// Command to run, preferring the repair command when `fix` is set.
    pub fn command_for(&self, fix: bool) -> &[String] {
        match (&self.fix_command, fix) {
            (Some(fix_command), true) => fix_command,
            _ => &self.command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_unique() {
        let mut names: Vec<_> = BuiltinCheck::ALL.iter().map(|c| c.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), BuiltinCheck::ALL.len());
    }

    #[test]
    fn test_builtin_commands() {
        let fmt_cmd = BuiltinCheck::Fmt.command();
        assert_eq!(fmt_cmd[0], "cargo");
        assert!(fmt_cmd.contains(&"--check".to_string()));

        let links_cmd = BuiltinCheck::Links.command();
        assert_eq!(links_cmd[0], "lychee");
    }

    #[test]
    fn test_builtin_fix_command() {
        assert!(BuiltinCheck::Fmt.fix_command().is_some());
        assert!(BuiltinCheck::Clippy.fix_command().is_none());
        assert!(BuiltinCheck::Test.fix_command().is_none());
    }

    #[test]
    fn test_only_machete_rewrites_manifest() {
        let rewriting: Vec<_> = BuiltinCheck::ALL
            .iter()
            .filter(|c| c.rewrites_manifest())
            .collect();
        assert_eq!(rewriting, vec![&BuiltinCheck::Machete]);
    }

    #[test]
    fn test_command_for_prefers_fix() {
        let config = StageConfig::from_builtin(BuiltinCheck::Fmt);
        assert!(config.command_for(false).contains(&"--check".to_string()));
        assert!(!config.command_for(true).contains(&"--check".to_string()));

        let clippy = StageConfig::from_builtin(BuiltinCheck::Clippy);
        assert_eq!(clippy.command_for(true), clippy.command.as_slice());
    }

    #[test]
    fn test_stage_config_custom() {
        let config = StageConfig::custom(
            "my_stage",
            vec!["echo".to_string(), "hello".to_string()],
        );
        assert_eq!(config.name, "my_stage");
        assert!(config.fix_command.is_none());
    }
}
