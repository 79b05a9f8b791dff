//! The validation suite runner.

use crate::consistency::ConsistencyReport;
use crate::error::{Result, SuiteError};
use crate::registry::{CheckEntry, CheckKind, CheckRegistry, AGGREGATE_CHECK};
use crate::runner::{OutputMode, ProcessExecutor, ToolExecutor};
use crate::workflow::WorkflowReferences;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use upkeep_core::{assert_clean, CleanScope, GitCli, UpkeepConfig, Validator, Vcs};

/// Runs named checks from a [`CheckRegistry`].
pub struct CheckSuite {
    registry: CheckRegistry,
    executor: Arc<dyn ToolExecutor>,
    vcs: Arc<dyn Vcs>,
    workflows_dir: PathBuf,
    runner_command: String,
    fix: bool,
}

impl CheckSuite {
    pub fn new(
        registry: CheckRegistry,
        executor: Arc<dyn ToolExecutor>,
        vcs: Arc<dyn Vcs>,
        workflows_dir: impl Into<PathBuf>,
        runner_command: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            executor,
            vcs,
            workflows_dir: workflows_dir.into(),
            runner_command: runner_command.into(),
            fix: false,
        }
    }

    /// The builtin registry wired to real processes and `git` in the
    /// configured workspace.
    pub fn for_workspace(config: &UpkeepConfig, output: OutputMode) -> Self {
        let root = config.workspace_root.clone();
        let manifest = config
            .manifests
            .first()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("Cargo.toml"));

        Self::new(
            CheckRegistry::builtin(manifest),
            Arc::new(ProcessExecutor::new(&root, output)),
            Arc::new(GitCli::new(&root)),
            config.resolve(&config.workflows_dir),
            config.runner_command.clone(),
        )
    }

    /// Prefer each check's auto-repair command where it has one.
    pub fn with_fix(mut self, fix: bool) -> Self {
        self.fix = fix;
        self
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// Run `names` in order, or the aggregate when `names` is empty.
    ///
    /// All names are resolved before anything runs. The first failure
    /// stops the run.
    pub async fn run<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        if names.is_empty() {
            return self.run_aggregate().await;
        }

        let entries = names
            .iter()
            .map(|n| self.lookup(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        for entry in entries {
            if entry.is_aggregate() {
                self.run_aggregate().await?;
            } else {
                self.run_single(entry).await?;
            }
        }
        Ok(())
    }

    /// Run every check in the aggregate body, stopping at the first failure.
    pub async fn run_aggregate(&self) -> Result<()> {
        info!(
            check = AGGREGATE_CHECK,
            checks = self.registry.aggregate_body().len(),
            "running aggregate"
        );
        for name in self.registry.aggregate_body() {
            let entry = self.lookup(name)?;
            self.run_single(entry).await?;
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<&CheckEntry> {
        self.registry
            .get(name)
            .ok_or_else(|| SuiteError::UnknownCheck(name.to_string()))
    }

    async fn run_single(&self, entry: &CheckEntry) -> Result<()> {
        match &entry.kind {
            CheckKind::Tool { stage, clean_path } => {
                if let Some(path) = clean_path {
                    assert_clean(self.vcs.as_ref(), Some(path.as_path()), CleanScope::Worktree).await?;
                }

                let command = stage.command_for(self.fix);
                info!(check = %entry.name, "running check");
                let result = self.executor.execute(&entry.name, command).await?;
                debug!(check = %entry.name, duration_ms = result.duration_ms, "check finished");

                if !result.passed() {
                    warn!(check = %entry.name, exit_code = result.exit_code, "check failed");
                    return Err(SuiteError::CheckFailed {
                        check: entry.name.clone(),
                        exit_code: result.exit_code,
                    });
                }
                Ok(())
            }
            CheckKind::SelfConsistency => self.self_check().await,
            CheckKind::Aggregate => Err(SuiteError::InvalidRegistry(format!(
                "'{}' cannot run inside the aggregate",
                entry.name
            ))),
        }
    }

    /// The registry with `declared_in_ci` filled in from the workflows.
    pub fn annotated_registry(&self) -> Result<CheckRegistry> {
        let refs = WorkflowReferences::load_dir(&self.workflows_dir, &self.runner_command)?;
        let mut registry = self.registry.clone();
        registry.mark_ci_references(&refs);
        Ok(registry)
    }

    /// Compare the registry, the aggregate body and the CI workflows.
    pub fn consistency_report(&self) -> Result<ConsistencyReport> {
        let refs = WorkflowReferences::load_dir(&self.workflows_dir, &self.runner_command)?;
        Ok(ConsistencyReport::evaluate(
            &self.registry,
            &refs,
            &self.runner_command,
        ))
    }

    async fn self_check(&self) -> Result<()> {
        info!(check = crate::registry::SELF_CHECK, "checking registry consistency");
        let report = self.consistency_report()?;
        if report.passed() {
            Ok(())
        } else {
            Err(SuiteError::Consistency(report))
        }
    }
}

#[async_trait]
impl Validator for CheckSuite {
    async fn validate(&self) -> anyhow::Result<()> {
        self.run_aggregate().await?;
        Ok(())
    }
}
