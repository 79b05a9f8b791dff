//! The check registry.
//!
//! Built once at startup. Each declared check is registered together with
//! its membership in the aggregate body, so the aggregate iterates the same
//! structure the registry declares rather than a separately written list.

use crate::error::{Result, SuiteError};
use crate::stage::{BuiltinCheck, StageConfig};
use crate::workflow::WorkflowReferences;
use std::collections::HashSet;
use std::path::PathBuf;

/// Name of the aggregate "run everything" check.
pub const AGGREGATE_CHECK: &str = "all";

/// Name of the self-consistency meta-check.
pub const SELF_CHECK: &str = "self";

/// How a check is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    /// Run an external tool. With `clean_path` set, the working-tree gate
    /// must pass for that path first.
    Tool {
        stage: StageConfig,
        clean_path: Option<PathBuf>,
    },
    /// Verify registry, aggregate body and CI workflows agree.
    SelfConsistency,
    /// Run every check in the aggregate body.
    Aggregate,
}

/// A named check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckEntry {
    pub name: String,
    pub kind: CheckKind,
    /// Whether some CI job invokes the runner with this name.
    pub declared_in_ci: bool,
}

impl CheckEntry {
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, CheckKind::Aggregate)
    }
}

/// Ordered mapping from check name to invocation, plus the aggregate body.
#[derive(Debug, Clone)]
pub struct CheckRegistry {
    entries: Vec<CheckEntry>,
    aggregate_body: Vec<String>,
}

impl CheckRegistry {
    pub fn builder() -> CheckRegistryBuilder {
        CheckRegistryBuilder::default()
    }

    /// The builtin catalogue: `self` first, then every [`BuiltinCheck`].
    ///
    /// `manifest` is the path guarded before manifest-rewriting tools run.
    pub fn builtin(manifest: impl Into<PathBuf>) -> Self {
        let manifest = manifest.into();
        let mut builder = Self::builder().check(SELF_CHECK, CheckKind::SelfConsistency);
        for check in BuiltinCheck::ALL {
            builder = builder.check(
                check.name(),
                CheckKind::Tool {
                    stage: StageConfig::from_builtin(check),
                    clean_path: check.rewrites_manifest().then(|| manifest.clone()),
                },
            );
        }
        builder
            .build()
            .unwrap_or_else(|e| unreachable!("builtin registry is valid: {e}"))
    }

    pub fn get(&self, name: &str) -> Option<&CheckEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// All entries in registration order, the aggregate last.
    pub fn entries(&self) -> &[CheckEntry] {
        &self.entries
    }

    /// Declared check names, excluding the aggregate, in registration order.
    pub fn declared_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !e.is_aggregate())
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Names the aggregate runs, in order.
    pub fn aggregate_body(&self) -> &[String] {
        &self.aggregate_body
    }

    pub fn has_self_check(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.kind, CheckKind::SelfConsistency))
    }

    /// Record which checks CI jobs invoke.
    pub fn mark_ci_references(&mut self, refs: &WorkflowReferences) {
        for entry in &mut self.entries {
            entry.declared_in_ci = !refs.jobs_for(&entry.name).is_empty();
        }
    }
}

/// Builder for [`CheckRegistry`].
#[derive(Debug, Default)]
pub struct CheckRegistryBuilder {
    entries: Vec<CheckEntry>,
    aggregate_body: Vec<String>,
}

impl CheckRegistryBuilder {
    /// Declare a check and include it in the aggregate.
    pub fn check(self, name: impl Into<String>, kind: CheckKind) -> Self {
        let name = name.into();
        self.declare(name.clone(), kind).include(name)
    }

    /// Declare a check without adding it to the aggregate.
    pub fn declare(mut self, name: impl Into<String>, kind: CheckKind) -> Self {
        self.entries.push(CheckEntry {
            name: name.into(),
            kind,
            declared_in_ci: false,
        });
        self
    }

    /// Append a name to the aggregate body.
    pub fn include(mut self, name: impl Into<String>) -> Self {
        self.aggregate_body.push(name.into());
        self
    }

    pub fn build(mut self) -> Result<CheckRegistry> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.name == AGGREGATE_CHECK || entry.is_aggregate() {
                return Err(SuiteError::InvalidRegistry(format!(
                    "'{}' cannot be declared; the aggregate is implicit",
                    entry.name
                )));
            }
            if entry.name.trim().is_empty() || entry.name.starts_with('-') {
                return Err(SuiteError::InvalidRegistry(format!(
                    "invalid check name {:?}",
                    entry.name
                )));
            }
            if !seen.insert(entry.name.clone()) {
                return Err(SuiteError::InvalidRegistry(format!(
                    "check '{}' declared twice",
                    entry.name
                )));
            }
            if let CheckKind::Tool { stage, .. } = &entry.kind {
                if stage.command.is_empty() {
                    return Err(SuiteError::InvalidRegistry(format!(
                        "check '{}' has an empty command",
                        entry.name
                    )));
                }
            }
        }
        if self.aggregate_body.iter().any(|n| n == AGGREGATE_CHECK) {
            return Err(SuiteError::InvalidRegistry(
                "the aggregate cannot include itself".to_string(),
            ));
        }

        self.entries.push(CheckEntry {
            name: AGGREGATE_CHECK.to_string(),
            kind: CheckKind::Aggregate,
            declared_in_ci: false,
        });

        Ok(CheckRegistry {
            entries: self.entries,
            aggregate_body: self.aggregate_body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(name: &str) -> CheckKind {
        CheckKind::Tool {
            stage: StageConfig::custom(name, vec!["echo".to_string(), name.to_string()]),
            clean_path: None,
        }
    }

    #[test]
    fn builtin_registry_shape() {
        let registry = CheckRegistry::builtin("Cargo.toml");

        assert_eq!(
            registry.declared_names(),
            vec!["self", "fmt", "clippy", "test", "doc", "audit", "machete", "links"]
        );
        assert_eq!(registry.aggregate_body(), registry.declared_names().as_slice());
        assert!(registry.has_self_check());

        let aggregates: Vec<_> = registry
            .entries()
            .iter()
            .filter(|e| e.is_aggregate())
            .collect();
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].name, AGGREGATE_CHECK);
    }

    #[test]
    fn machete_guards_manifest() {
        let registry = CheckRegistry::builtin("Cargo.toml");
        match &registry.get("machete").unwrap().kind {
            CheckKind::Tool { clean_path, .. } => {
                assert_eq!(clean_path.as_deref(), Some(std::path::Path::new("Cargo.toml")))
            }
            other => panic!("unexpected kind: {other:?}"),
        }
        match &registry.get("fmt").unwrap().kind {
            CheckKind::Tool { clean_path, .. } => assert!(clean_path.is_none()),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn declare_only_stays_out_of_aggregate() {
        let registry = CheckRegistry::builder()
            .check("a", echo("a"))
            .declare("b", echo("b"))
            .build()
            .unwrap();
        assert_eq!(registry.declared_names(), vec!["a", "b"]);
        assert_eq!(registry.aggregate_body(), &["a".to_string()]);
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = CheckRegistry::builder()
            .check("a", echo("a"))
            .check("a", echo("a"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn aggregate_name_is_reserved() {
        assert!(CheckRegistry::builder()
            .check(AGGREGATE_CHECK, echo("x"))
            .build()
            .is_err());
        assert!(CheckRegistry::builder()
            .include(AGGREGATE_CHECK)
            .build()
            .is_err());
    }

    #[test]
    fn empty_command_rejected() {
        let err = CheckRegistry::builder()
            .check(
                "noop",
                CheckKind::Tool {
                    stage: StageConfig::custom("noop", Vec::new()),
                    clean_path: None,
                },
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SuiteError::InvalidRegistry(_)));
    }
}
