//! Working-tree gate and the git operations the pipeline needs.

use crate::command::run_tool;
use crate::error::{Result, UpkeepError};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which changes make a path count as dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanScope {
    /// Staged, unstaged and untracked changes.
    Everything,
    /// Unstaged and untracked changes only. Staged content survives in
    /// the index, so a tool that rewrites the file cannot destroy it.
    Worktree,
}

/// One line of `git status --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Index column (`X`).
    pub index: char,
    /// Work tree column (`Y`).
    pub worktree: char,
    pub path: String,
}

impl StatusEntry {
    /// Parse a porcelain v1 line such as ` M Cargo.lock` or `?? new.rs`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut chars = line.chars();
        let index = chars.next()?;
        let worktree = chars.next()?;
        let path = line.get(3..)?.trim();
        if path.is_empty() {
            return None;
        }
        Some(Self {
            index,
            worktree,
            path: path.to_string(),
        })
    }

    pub fn is_untracked(&self) -> bool {
        self.index == '?'
    }

    /// Whether the work tree copy differs from the index.
    pub fn touches_worktree(&self) -> bool {
        self.worktree != ' '
    }

    pub fn is_dirty_in(&self, scope: CleanScope) -> bool {
        match scope {
            CleanScope::Everything => true,
            CleanScope::Worktree => self.touches_worktree(),
        }
    }
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {}", self.index, self.worktree, self.path)
    }
}

/// Version-control operations used by the pipeline and the checks.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Status of `path`, or of the whole tree when `None`.
    async fn status(&self, path: Option<&Path>) -> Result<Vec<StatusEntry>>;

    async fn stage(&self, paths: &[PathBuf]) -> Result<()>;

    /// Remove `paths` from the index, leaving the work tree untouched.
    async fn unstage(&self, paths: &[PathBuf]) -> Result<()>;

    async fn commit(&self, message: &str) -> Result<()>;

    /// Local commits not yet on the remote tracking branch.
    async fn unpushed_commit_count(&self) -> Result<u64>;
}

/// Fail with `DirtyWorkingTree` if `path` (or the whole tree) has changes
/// within `scope`.
pub async fn assert_clean(vcs: &dyn Vcs, path: Option<&Path>, scope: CleanScope) -> Result<()> {
    let dirty: Vec<String> = vcs
        .status(path)
        .await?
        .into_iter()
        .filter(|e| e.is_dirty_in(scope))
        .map(|e| e.to_string())
        .collect();

    if dirty.is_empty() {
        return Ok(());
    }

    let scope = match path {
        Some(p) => p.display().to_string(),
        None => "whole tree".to_string(),
    };
    Err(UpkeepError::DirtyWorkingTree {
        scope,
        entries: dirty,
    })
}

/// [`Vcs`] implemented with the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    async fn git<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Ok(run_tool("git", args, &self.repo_root).await?.stdout)
    }

    async fn rev_count(&self, range: &str) -> Result<u64> {
        let out = self.git(["rev-list", "--count", range]).await?;
        out.trim().parse().map_err(|_| UpkeepError::ToolFailed {
            tool: "git".to_string(),
            args: format!("rev-list --count {range}"),
            exit_code: 0,
            stderr: format!("unexpected output: {}", out.trim()),
        })
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn status(&self, path: Option<&Path>) -> Result<Vec<StatusEntry>> {
        let mut args: Vec<std::ffi::OsString> = vec![
            "status".into(),
            "--porcelain".into(),
            "--untracked-files=all".into(),
        ];
        if let Some(p) = path {
            args.push(std::ffi::OsString::from("--"));
            args.push(p.as_os_str().to_os_string());
        }
        let out = self.git(args).await?;
        Ok(out.lines().filter_map(StatusEntry::parse).collect())
    }

    async fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        debug!(?paths, "staging");
        let mut args: Vec<std::ffi::OsString> = vec!["add".into(), "--".into()];
        args.extend(paths.iter().map(|p| p.as_os_str().to_os_string()));
        self.git(args).await.map(|_| ())
    }

    async fn unstage(&self, paths: &[PathBuf]) -> Result<()> {
        debug!(?paths, "unstaging");
        let mut args: Vec<std::ffi::OsString> =
            vec!["reset".into(), "-q".into(), "HEAD".into(), "--".into()];
        args.extend(paths.iter().map(|p| p.as_os_str().to_os_string()));
        self.git(args).await.map(|_| ())
    }

    async fn commit(&self, message: &str) -> Result<()> {
        self.git(["commit", "-q", "-m", message]).await.map(|_| ())
    }

    async fn unpushed_commit_count(&self) -> Result<u64> {
        match self.rev_count("@{upstream}..HEAD").await {
            Ok(n) => Ok(n),
            Err(UpkeepError::ToolFailed { stderr, .. }) => {
                warn!(%stderr, "no upstream branch; counting all commits on HEAD");
                self.rev_count("HEAD").await
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        run_git(dir.path(), &["add", "Cargo.toml"]);
        run_git(dir.path(), &["commit", "-q", "-m", "initial"]);
        dir
    }

    #[test]
    fn parse_porcelain_lines() {
        let modified = StatusEntry::parse(" M Cargo.lock").unwrap();
        assert_eq!(modified.index, ' ');
        assert_eq!(modified.worktree, 'M');
        assert_eq!(modified.path, "Cargo.lock");
        assert!(modified.touches_worktree());

        let untracked = StatusEntry::parse("?? notes.txt").unwrap();
        assert!(untracked.is_untracked());
        assert!(untracked.touches_worktree());

        let staged = StatusEntry::parse("M  Cargo.toml").unwrap();
        assert!(!staged.touches_worktree());
        assert!(!staged.is_dirty_in(CleanScope::Worktree));
        assert!(staged.is_dirty_in(CleanScope::Everything));

        assert!(StatusEntry::parse("").is_none());
        assert!(StatusEntry::parse("M").is_none());
    }

    #[tokio::test]
    async fn clean_repo_passes_gate() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        assert_clean(&git, None, CleanScope::Everything)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn untracked_file_fails_gate() {
        let repo = make_git_repo();
        std::fs::write(repo.path().join("stray.txt"), "x").unwrap();
        let git = GitCli::new(repo.path());

        let err = assert_clean(&git, None, CleanScope::Everything)
            .await
            .unwrap_err();
        match err {
            UpkeepError::DirtyWorkingTree { scope, entries } => {
                assert_eq!(scope, "whole tree");
                assert_eq!(entries, vec!["?? stray.txt".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn path_gate_ignores_other_files() {
        let repo = make_git_repo();
        std::fs::write(repo.path().join("stray.txt"), "x").unwrap();
        let git = GitCli::new(repo.path());

        assert_clean(&git, Some(Path::new("Cargo.toml")), CleanScope::Everything)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn staged_manifest_passes_worktree_scope_only() {
        let repo = make_git_repo();
        std::fs::write(repo.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        let git = GitCli::new(repo.path());
        git.stage(&[PathBuf::from("Cargo.toml")]).await.unwrap();

        let manifest = Some(Path::new("Cargo.toml"));
        assert_clean(&git, manifest, CleanScope::Worktree)
            .await
            .unwrap();
        assert!(assert_clean(&git, manifest, CleanScope::Everything)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn stage_unstage_and_commit() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        std::fs::write(repo.path().join("Cargo.lock"), "version = 3\n").unwrap();
        let lock = vec![PathBuf::from("Cargo.lock")];

        git.stage(&lock).await.unwrap();
        let status = git.status(Some(Path::new("Cargo.lock"))).await.unwrap();
        assert_eq!(status[0].index, 'A');

        git.unstage(&lock).await.unwrap();
        let status = git.status(Some(Path::new("Cargo.lock"))).await.unwrap();
        assert!(status[0].is_untracked());

        let before = git.unpushed_commit_count().await.unwrap();
        git.stage(&lock).await.unwrap();
        git.commit("cargo update").await.unwrap();
        assert_eq!(git.unpushed_commit_count().await.unwrap(), before + 1);
        assert!(git.status(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unpushed_count_uses_upstream_when_present() {
        let upstream = make_git_repo();
        let clone_parent = tempfile::tempdir().unwrap();
        run_git(
            clone_parent.path(),
            &["clone", "-q", upstream.path().to_str().unwrap(), "work"],
        );
        let work = clone_parent.path().join("work");
        run_git(&work, &["config", "user.name", "test-user"]);
        run_git(&work, &["config", "user.email", "test@example.com"]);

        let git = GitCli::new(&work);
        assert_eq!(git.unpushed_commit_count().await.unwrap(), 0);

        run_git(&work, &["commit", "-q", "--allow-empty", "-m", "local"]);
        assert_eq!(git.unpushed_commit_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn status_outside_repo_fails() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        assert!(git.status(None).await.is_err());
    }
}
