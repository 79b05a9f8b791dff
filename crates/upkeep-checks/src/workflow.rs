//! Read-only parsing of CI workflow definitions.
//!
//! Only the shape `jobs.<id>.steps[].run` is inspected. A job references
//! check `n` when one of its `run` lines invokes the runner command with `n`
//! as an argument.

use crate::error::{Result, SuiteError};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct Workflow {
    #[serde(default)]
    jobs: BTreeMap<String, Job>,
}

#[derive(Debug, Default, Deserialize)]
struct Job {
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
struct Step {
    #[serde(default)]
    run: Option<String>,
}

/// A job inside a workflow file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct JobRef {
    pub file: PathBuf,
    pub job: String,
}

/// Check names referenced by CI jobs, with the jobs that reference them.
#[derive(Debug, Clone, Default)]
pub struct WorkflowReferences {
    by_check: BTreeMap<String, BTreeSet<JobRef>>,
}

impl WorkflowReferences {
    /// Parse every `.yml`/`.yaml` file directly inside `dir`.
    ///
    /// A missing directory yields no references.
    pub fn load_dir(dir: &Path, runner_command: &str) -> Result<Self> {
        let mut refs = Self::default();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no workflow directory");
            return Ok(refs);
        }

        let read_err = |path: &Path, e: std::io::Error| SuiteError::Workflow {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| read_err(dir, e))? {
            let path = entry.map_err(|e| read_err(dir, e))?.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml" | "yaml")
            );
            if is_yaml && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        for path in files {
            let text = std::fs::read_to_string(&path).map_err(|e| read_err(&path, e))?;
            refs.merge(Self::parse_str(&path, &text, runner_command)?);
        }
        Ok(refs)
    }

    /// Parse one workflow document. `file` is used for reporting only.
    pub fn parse_str(file: &Path, text: &str, runner_command: &str) -> Result<Self> {
        let workflow: Workflow = serde_yaml::from_str(text).map_err(|e| SuiteError::Workflow {
            path: file.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut refs = Self::default();
        for (job_id, job) in workflow.jobs {
            for script in job.steps.iter().filter_map(|s| s.run.as_deref()) {
                for line in script.lines() {
                    for check in referenced_checks(line, runner_command) {
                        refs.by_check.entry(check).or_default().insert(JobRef {
                            file: file.to_path_buf(),
                            job: job_id.clone(),
                        });
                    }
                }
            }
        }
        Ok(refs)
    }

    fn merge(&mut self, other: Self) {
        for (check, jobs) in other.by_check {
            self.by_check.entry(check).or_default().extend(jobs);
        }
    }

    /// Jobs that invoke the runner with `check`.
    pub fn jobs_for(&self, check: &str) -> Vec<&JobRef> {
        self.by_check
            .get(check)
            .map(|jobs| jobs.iter().collect())
            .unwrap_or_default()
    }

    /// Every referenced check name, sorted.
    pub fn check_names(&self) -> impl Iterator<Item = &str> {
        self.by_check.keys().map(String::as_str)
    }
}

/// Runner flags that take the following token as their value.
const RUNNER_VALUE_FLAGS: &[&str] = &["--workspace"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Outside,
    /// After `--bin <runner>`: cargo's own arguments until `--`.
    CargoArgs,
    RunnerArgs,
}

/// Check names passed to `runner_command` on one shell line.
///
/// The runner token matches exactly or as a path ending in
/// `/<runner_command>`. When it is the value of cargo's `--bin`, names
/// start after `--`. Arguments run until the next `&&`, `||`, `;` or `|`;
/// flags, the values of runner flags such as `--workspace`, and quotes are
/// ignored.
pub fn referenced_checks(line: &str, runner_command: &str) -> Vec<String> {
    let suffix = format!("/{runner_command}");
    let is_runner = |token: &str| token == runner_command || token.ends_with(&suffix);

    let mut checks = Vec::new();
    let mut scan = Scan::Outside;
    let mut skip_value = false;
    let mut previous = "";

    for raw in line.split_whitespace() {
        let token = raw.trim_matches(|c| c == '"' || c == '\'');
        let (token, terminated) = match token.strip_suffix(';') {
            Some(rest) => (rest, true),
            None => (token, false),
        };

        if matches!(token, "&&" | "||" | "|") {
            scan = Scan::Outside;
        } else if scan == Scan::RunnerArgs && skip_value {
            skip_value = false;
        } else if is_runner(token) {
            scan = if previous == "--bin" {
                Scan::CargoArgs
            } else {
                Scan::RunnerArgs
            };
        } else if token.strip_prefix("--bin=").is_some_and(is_runner) {
            scan = Scan::CargoArgs;
        } else {
            match scan {
                Scan::Outside => {}
                Scan::CargoArgs => {
                    if token == "--" {
                        scan = Scan::RunnerArgs;
                    }
                }
                Scan::RunnerArgs => {
                    if token.starts_with('-') {
                        skip_value = RUNNER_VALUE_FLAGS.contains(&token);
                    } else if !token.is_empty() {
                        checks.push(token.to_string());
                    }
                }
            }
        }

        if terminated || scan == Scan::Outside {
            scan = Scan::Outside;
            skip_value = false;
        }
        previous = token;
    }
    checks
}
