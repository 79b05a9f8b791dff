//! Self-consistency evaluation for the check registry.
//!
//! Three name sets must agree: the registry's declared checks, the
//! aggregate body, and the checks CI jobs invoke. `self` must appear in all
//! three.

use crate::registry::{CheckRegistry, AGGREGATE_CHECK, SELF_CHECK};
use crate::workflow::WorkflowReferences;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One disagreement between the three sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyViolation {
    /// Declared but not run by the aggregate.
    NotInAggregate { check: String },
    /// Run by the aggregate but never declared.
    NotDeclared { check: String },
    /// Declared but no CI job invokes it.
    MissingCiJob { check: String, template: String },
    /// A CI job invokes a name the registry does not declare. Invoking the
    /// aggregate from CI is allowed.
    UnknownCiReference { check: String, jobs: Vec<String> },
    /// The registry has no self-consistency check.
    SelfCheckMissing,
}

impl ConsistencyViolation {
    /// The check name this violation is about, if any.
    pub fn check(&self) -> Option<&str> {
        match self {
            ConsistencyViolation::NotInAggregate { check }
            | ConsistencyViolation::NotDeclared { check }
            | ConsistencyViolation::MissingCiJob { check, .. }
            | ConsistencyViolation::UnknownCiReference { check, .. } => Some(check),
            ConsistencyViolation::SelfCheckMissing => None,
        }
    }
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyViolation::NotInAggregate { check } => {
                write!(f, "check '{check}' is declared but not run by 'all'")
            }
            ConsistencyViolation::NotDeclared { check } => {
                write!(f, "check '{check}' is run by 'all' but not declared")
            }
            ConsistencyViolation::MissingCiJob { check, .. } => {
                write!(f, "check '{check}' has no CI job")
            }
            ConsistencyViolation::UnknownCiReference { check, jobs } => write!(
                f,
                "CI invokes unknown check '{check}' (jobs: {})",
                jobs.join(", ")
            ),
            ConsistencyViolation::SelfCheckMissing => {
                write!(f, "the '{SELF_CHECK}' check is not registered")
            }
        }
    }
}

/// Outcome of the `self` check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub declared: Vec<String>,
    pub aggregate_body: Vec<String>,
    pub violations: Vec<ConsistencyViolation>,
}

impl ConsistencyReport {
    pub fn evaluate(
        registry: &CheckRegistry,
        refs: &WorkflowReferences,
        runner_command: &str,
    ) -> Self {
        let declared: Vec<String> = registry
            .declared_names()
            .into_iter()
            .map(String::from)
            .collect();
        let aggregate_body = registry.aggregate_body().to_vec();

        let declared_set: BTreeSet<&str> = declared.iter().map(String::as_str).collect();
        let body_set: BTreeSet<&str> = aggregate_body.iter().map(String::as_str).collect();

        let mut violations = Vec::new();

        if !registry.has_self_check() {
            violations.push(ConsistencyViolation::SelfCheckMissing);
        }

        for check in declared.iter().filter(|n| !body_set.contains(n.as_str())) {
            violations.push(ConsistencyViolation::NotInAggregate {
                check: check.clone(),
            });
        }
        let mut undeclared = BTreeSet::new();
        for check in aggregate_body
            .iter()
            .filter(|n| !declared_set.contains(n.as_str()))
        {
            if undeclared.insert(check.as_str()) {
                violations.push(ConsistencyViolation::NotDeclared {
                    check: check.clone(),
                });
            }
        }

        for check in &declared {
            if refs.jobs_for(check).is_empty() {
                violations.push(ConsistencyViolation::MissingCiJob {
                    check: check.clone(),
                    template: job_template(check, runner_command),
                });
            }
        }

        for check in refs.check_names() {
            if check != AGGREGATE_CHECK && !declared_set.contains(check) {
                violations.push(ConsistencyViolation::UnknownCiReference {
                    check: check.to_string(),
                    jobs: refs
                        .jobs_for(check)
                        .into_iter()
                        .map(|j| format!("{}:{}", j.file.display(), j.job))
                        .collect(),
                });
            }
        }

        Self {
            declared,
            aggregate_body,
            violations,
        }
    }

    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Names mentioned by any violation.
    pub fn offending_checks(&self) -> BTreeSet<&str> {
        self.violations.iter().filter_map(|v| v.check()).collect()
    }

    fn sets_differ(&self) -> bool {
        self.violations.iter().any(|v| {
            matches!(
                v,
                ConsistencyViolation::NotInAggregate { .. }
                    | ConsistencyViolation::NotDeclared { .. }
            )
        })
    }
}

/// A GitHub Actions job stanza invoking `runner_command check`.
pub fn job_template(check: &str, runner_command: &str) -> String {
    format!(
        "  {check}:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: actions/checkout@v4\n      - run: {runner_command} {check}\n"
    )
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return writeln!(f, "registry, aggregate and CI agree");
        }

        for violation in &self.violations {
            writeln!(f, "  - {violation}")?;
        }

        if self.sets_differ() {
            // Ordered diff: `=` in both, `-` declared only, `+` aggregate only.
            let body: BTreeSet<&str> = self.aggregate_body.iter().map(String::as_str).collect();
            let declared: BTreeSet<&str> = self.declared.iter().map(String::as_str).collect();
            writeln!(f, "\ndeclared vs. aggregate body:")?;
            for name in &self.declared {
                let marker = if body.contains(name.as_str()) { '=' } else { '-' };
                writeln!(f, "  {marker} {name}")?;
            }
            for name in self
                .aggregate_body
                .iter()
                .filter(|n| !declared.contains(n.as_str()))
            {
                writeln!(f, "  + {name}")?;
            }
        }

        for violation in &self.violations {
            if let ConsistencyViolation::MissingCiJob { check, template } = violation {
                writeln!(f, "\nadd a CI job for '{check}' under `jobs:`:\n{template}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CheckKind;
    use crate::stage::StageConfig;
    use std::path::Path;

    fn tool(name: &str) -> CheckKind {
        CheckKind::Tool {
            stage: StageConfig::custom(name, vec!["true".to_string()]),
            clean_path: None,
        }
    }

    fn ci(lines: &[&str]) -> WorkflowReferences {
        let mut yaml = String::from("jobs:\n");
        for (i, line) in lines.iter().enumerate() {
            yaml.push_str(&format!("  job{i}:\n    steps:\n      - run: {line}\n"));
        }
        WorkflowReferences::parse_str(Path::new("ci.yml"), &yaml, "runner").unwrap()
    }

    #[test]
    fn agreeing_sets_pass() {
        let registry = CheckRegistry::builder()
            .check(SELF_CHECK, CheckKind::SelfConsistency)
            .check("fmt", tool("fmt"))
            .build()
            .unwrap();
        let report =
            ConsistencyReport::evaluate(&registry, &ci(&["runner self", "runner fmt"]), "runner");
        assert!(report.passed(), "{report}");
    }

    #[test]
    fn missing_self_check_is_reported() {
        let registry = CheckRegistry::builder()
            .check("fmt", tool("fmt"))
            .build()
            .unwrap();
        let report = ConsistencyReport::evaluate(&registry, &ci(&["runner fmt"]), "runner");
        assert_eq!(report.violations, vec![ConsistencyViolation::SelfCheckMissing]);
    }

    #[test]
    fn ordered_diff_marks_both_directions() {
        let registry = CheckRegistry::builder()
            .check(SELF_CHECK, CheckKind::SelfConsistency)
            .declare("doc", tool("doc"))
            .include("ghost")
            .build()
            .unwrap();
        let report = ConsistencyReport::evaluate(
            &registry,
            &ci(&["runner self doc ghost"]),
            "runner",
        );
        assert!(!report.passed());

        let text = report.to_string();
        assert!(text.contains("  = self"));
        assert!(text.contains("  - doc"));
        assert!(text.contains("  + ghost"));
        assert!(text.contains("'ghost' is run by 'all' but not declared"));
        assert!(text.contains("CI invokes unknown check 'ghost'"));
    }

    #[test]
    fn missing_ci_job_includes_template() {
        let registry = CheckRegistry::builder()
            .check(SELF_CHECK, CheckKind::SelfConsistency)
            .check("audit", tool("audit"))
            .build()
            .unwrap();
        let report = ConsistencyReport::evaluate(&registry, &ci(&["runner self"]), "runner");

        assert_eq!(report.offending_checks(), BTreeSet::from(["audit"]));
        let text = report.to_string();
        assert!(text.contains("      - run: runner audit"));
    }
}
