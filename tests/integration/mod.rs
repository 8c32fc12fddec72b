//! Integration test suite for grove
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **cli**: the `grove` binary's argument handling and error exits
//! - **workflow**: update/install/export against a scripted VCS
//! - **git_backend**: end-to-end runs of the binary against real git repositories
//! - **hg_backend**: the same against a Mercurial repository

mod cli;
mod git_backend;
mod hg_backend;
mod workflow;

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A project directory and a private grove home.
pub struct Project {
    _dir: TempDir,
    pub root: PathBuf,
    pub home: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        let home = dir.path().join("home");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&home).unwrap();
        Self {
            _dir: dir,
            root,
            home,
        }
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.root.join(rel)).unwrap()
    }

    pub fn scratch(&self) -> &Path {
        self.root.parent().unwrap()
    }

    pub fn grove(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("grove").unwrap();
        cmd.current_dir(&self.root)
            .env_remove("RUST_LOG")
            .env("GROVE_HOME", &self.home)
            .env("NO_COLOR", "1");
        cmd
    }
}
