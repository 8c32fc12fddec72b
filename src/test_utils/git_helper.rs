//! Git test helper utilities
//!
//! Builds small real git repositories for tests that drive the git backend.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git command builder for tests
///
/// Use this instead of raw `std::process::Command` for git operations in tests.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    fn run_git_command(&self, args: &[&str], action: &str) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }

        Ok(output)
    }

    /// Create a new TestGit instance for the given repository path
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Create the directory, `git init` it on branch `master` and configure a test user.
    pub fn init_repo(repo_path: impl Into<PathBuf>) -> Result<Self> {
        let git = Self::new(repo_path);
        std::fs::create_dir_all(&git.repo_path)?;
        git.run_git_command(&["init", "-q"], "Failed to initialize git repository")?;
        git.run_git_command(&["symbolic-ref", "HEAD", "refs/heads/master"], "Failed to name branch")?;
        git.config_user()?;
        Ok(git)
    }

    /// Configure git user for tests
    pub fn config_user(&self) -> Result<()> {
        self.run_git_command(
            &["config", "user.email", "test@grove.example"],
            "Failed to configure git user email",
        )?;
        self.run_git_command(&["config", "user.name", "Test User"], "Failed to configure git user name")?;
        self.run_git_command(&["config", "commit.gpgsign", "false"], "Failed to disable signing")?;
        Ok(())
    }

    /// Write `contents` to `rel` inside the repository, creating parent directories.
    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.repo_path.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Add all files to staging
    pub fn add_all(&self) -> Result<()> {
        self.run_git_command(&["add", "."], "Failed to add files to git")?;
        Ok(())
    }

    /// Create a commit with the given message
    pub fn commit(&self, message: &str) -> Result<()> {
        self.run_git_command(&["commit", "-q", "-m", message], "Failed to create git commit")?;
        Ok(())
    }

    /// Write a file, stage everything and commit. Returns the new HEAD.
    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) -> Result<String> {
        self.write_file(rel, contents)?;
        self.add_all()?;
        self.commit(message)?;
        self.rev_parse_head()
    }

    /// Create a tag
    pub fn tag(&self, tag_name: &str) -> Result<()> {
        self.run_git_command(&["tag", tag_name], &format!("Failed to create tag: {}", tag_name))?;
        Ok(())
    }

    /// Return the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Get current commit SHA
    pub fn rev_parse_head(&self) -> Result<String> {
        self.rev_parse("HEAD")
    }

    /// Resolve any revision expression to a commit SHA
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        let output = self.run_git_command(&["rev-parse", rev], &format!("Failed to resolve {rev}"))?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Checkout a branch or commit
    pub fn checkout(&self, ref_name: &str) -> Result<()> {
        self.run_git_command(&["checkout", "-q", ref_name], &format!("Failed to checkout: {}", ref_name))?;
        Ok(())
    }

    /// Create and checkout a branch
    pub fn create_branch(&self, branch_name: &str) -> Result<()> {
        self.run_git_command(
            &["checkout", "-q", "-b", branch_name],
            &format!("Failed to create branch: {}", branch_name),
        )?;
        Ok(())
    }

    /// `file://` URL of the repository, usable as a dependency remote
    pub fn url(&self) -> String {
        format!("file://{}", self.repo_path.display())
    }
}
