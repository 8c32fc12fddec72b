//! Mercurial test helper
//!
//! Counterpart of [`TestGit`](super::TestGit) for tests that drive the hg
//! backend. Callers skip when `hg` is not installed.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct TestHg {
    repo_path: PathBuf,
}

impl TestHg {
    fn run_hg_command(&self, args: &[&str], action: &str) -> Result<String> {
        let output = Command::new("hg")
            .args(args)
            .current_dir(&self.repo_path)
            .env("HGPLAIN", "1")
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Create the directory and `hg init` it.
    pub fn init_repo(repo_path: impl Into<PathBuf>) -> Result<Self> {
        let hg = Self {
            repo_path: repo_path.into(),
        };
        std::fs::create_dir_all(&hg.repo_path)?;
        hg.run_hg_command(&["init"], "Failed to initialize hg repository")?;
        Ok(hg)
    }

    /// Write a file, add it and commit. Returns the full node id of the commit.
    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) -> Result<String> {
        let path = self.repo_path.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        self.run_hg_command(&["add", "-q", rel], "Failed to add file")?;
        self.run_hg_command(
            &["commit", "-q", "-u", "Test User <test@grove.example>", "-m", message],
            "Failed to create hg commit",
        )?;
        self.run_hg_command(&["log", "-r", "tip", "--template", "{node}"], "Failed to read tip")
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Local path of the repository, usable as a dependency remote
    pub fn url(&self) -> String {
        self.repo_path.display().to_string()
    }
}
