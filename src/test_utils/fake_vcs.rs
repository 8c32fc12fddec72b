//! A scripted, in-memory VCS provider.
//!
//! [`FakeVcs`] serves remotes registered with [`FakeVcs::add_remote`]. A
//! "clone" creates the local directory with a `.git` marker and the scripted
//! files, so everything downstream of the VCS layer (cache layout, import
//! scanning, export) sees a real tree. Every operation is counted per remote
//! so tests can assert how often a repository was fetched.

use anyhow::Result;
use dashmap::{DashMap, DashSet};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::core::GroveError;
use crate::manifest::Dependency;
use crate::vcs::{ImportDiscovery, VcsKind, VcsProvider, VcsRepo};

/// Operations that change a working copy.
pub const MUTATING_OPERATIONS: [&str; 3] = ["get", "update", "update_version"];

/// Scripted contents of one remote repository.
#[derive(Debug, Clone)]
pub struct FakeRemote {
    pub tags: Vec<String>,
    pub branches: Vec<String>,
    pub default_branch: String,
    pub files: Vec<(String, String)>,
    pub fail_get: bool,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            branches: vec!["master".to_string()],
            default_branch: "master".to_string(),
            files: Vec::new(),
            fail_get: false,
        }
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| (*t).to_string()).collect();
        self
    }

    /// Branches in addition to the default branch.
    #[must_use]
    pub fn with_branches(mut self, branches: &[&str]) -> Self {
        for branch in branches {
            if !self.branches.iter().any(|b| b == branch) {
                self.branches.push((*branch).to_string());
            }
        }
        self
    }

    #[must_use]
    pub fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = branch.to_string();
        if !self.branches.iter().any(|b| b == branch) {
            self.branches.push(branch.to_string());
        }
        self
    }

    /// A file present in every checkout of the remote.
    #[must_use]
    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.push((path.to_string(), contents.to_string()));
        self
    }

    /// Make every clone of this remote fail.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_get = true;
        self
    }
}

#[derive(Debug, Clone)]
struct Checkout {
    remote: String,
    reference: String,
}

#[derive(Debug, Default)]
struct FakeState {
    remotes: DashMap<String, FakeRemote>,
    checkouts: DashMap<PathBuf, Checkout>,
    dirty: DashSet<PathBuf>,
    calls: DashMap<(String, String), usize>,
    delay: Option<Duration>,
}

impl FakeState {
    fn record(&self, operation: &str, remote: &str) {
        *self.calls.entry((operation.to_string(), remote.to_string())).or_insert(0) += 1;
    }
}

/// Provider serving scripted remotes.
#[derive(Debug, Clone)]
pub struct FakeVcs {
    state: Arc<FakeState>,
    discovery: Arc<ImportDiscovery>,
}

impl Default for FakeVcs {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeVcs {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState::default()),
            discovery: Arc::new(ImportDiscovery::offline()),
        }
    }

    /// Every operation sleeps for `delay` first, widening race windows.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        let state = FakeState {
            delay: Some(delay),
            ..FakeState::default()
        };
        for entry in self.state.remotes.iter() {
            state.remotes.insert(entry.key().clone(), entry.value().clone());
        }
        self.state = Arc::new(state);
        self
    }

    /// Serve `remote` (a full URL such as `https://example.com/a`).
    pub fn add_remote(&self, remote: &str, script: FakeRemote) {
        self.state.remotes.insert(remote.to_string(), script);
    }

    /// Mark the checkout at `local` as having uncommitted changes.
    pub fn mark_dirty(&self, local: &Path) {
        self.state.dirty.insert(local.to_path_buf());
    }

    /// The revision id a reference of `remote` resolves to.
    pub fn revision(remote: &str, reference: &str) -> String {
        let digest = Sha256::digest(format!("{remote}@{reference}").as_bytes());
        hex::encode(digest)[..40].to_string()
    }

    /// How often `operation` ran against `remote`.
    pub fn calls(&self, operation: &str, remote: &str) -> usize {
        self.state
            .calls
            .get(&(operation.to_string(), remote.to_string()))
            .map_or(0, |count| *count)
    }

    /// How often `operation` ran against any remote.
    pub fn total_calls(&self, operation: &str) -> usize {
        self.state
            .calls
            .iter()
            .filter(|entry| entry.key().0 == operation)
            .map(|entry| *entry.value())
            .sum()
    }

    /// Number of operations that modified a working copy.
    pub fn mutation_count(&self) -> usize {
        MUTATING_OPERATIONS.iter().map(|op| self.total_calls(op)).sum()
    }

    pub fn reset_calls(&self) {
        self.state.calls.clear();
    }
}

impl VcsProvider for FakeVcs {
    type Repo = FakeRepo;

    fn discovery(&self) -> &ImportDiscovery {
        &self.discovery
    }

    async fn open(&self, dep: &Dependency, local: &Path) -> Result<FakeRepo> {
        let remote = dep.remote();
        if let Some(kind) = dep.vcs
            && kind != VcsKind::Git
            && local.join(".git").exists()
        {
            return Err(GroveError::WrongVcs {
                path: local.display().to_string(),
                expected: kind.to_string(),
                found: VcsKind::Git.to_string(),
            }
            .into());
        }
        if let Some(checkout) = self.state.checkouts.get(local)
            && checkout.remote != remote
        {
            return Err(GroveError::WrongRemote {
                path: local.display().to_string(),
                expected: remote,
                found: checkout.remote.clone(),
            }
            .into());
        }
        Ok(FakeRepo {
            remote,
            local: local.to_path_buf(),
            state: Arc::clone(&self.state),
        })
    }
}

/// Working copy handed out by [`FakeVcs`].
#[derive(Debug)]
pub struct FakeRepo {
    remote: String,
    local: PathBuf,
    state: Arc<FakeState>,
}

impl FakeRepo {
    async fn enter(&self, operation: &str) {
        self.state.record(operation, &self.remote);
        if let Some(delay) = self.state.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn script(&self) -> Result<FakeRemote> {
        self.state
            .remotes
            .get(&self.remote)
            .map(|r| r.clone())
            .ok_or_else(|| {
                GroveError::VcsGetFailed {
                    remote: self.remote.clone(),
                    reason: "repository not found".to_string(),
                }
                .into()
            })
    }

    fn checked_out(&self) -> Result<String> {
        self.state
            .checkouts
            .get(&self.local)
            .map(|c| c.reference.clone())
            .ok_or_else(|| anyhow::anyhow!("no checkout at {}", self.local.display()))
    }

    /// Revision of `reference` if the remote knows it.
    fn resolve(&self, script: &FakeRemote, reference: &str) -> Option<String> {
        let named = script.tags.iter().chain(script.branches.iter()).find(|r| *r == reference);
        if let Some(name) = named {
            return Some(FakeVcs::revision(&self.remote, name));
        }
        script
            .tags
            .iter()
            .chain(script.branches.iter())
            .map(|name| FakeVcs::revision(&self.remote, name))
            .find(|rev| rev == reference)
    }
}

impl VcsRepo for FakeRepo {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    fn remote(&self) -> &str {
        &self.remote
    }

    fn local_path(&self) -> &Path {
        &self.local
    }

    async fn get(&self) -> Result<()> {
        self.enter("get").await;
        let script = self.script()?;
        if script.fail_get {
            return Err(GroveError::VcsGetFailed {
                remote: self.remote.clone(),
                reason: "scripted failure".to_string(),
            }
            .into());
        }
        tokio::fs::create_dir_all(self.local.join(".git")).await?;
        for (rel, contents) in &script.files {
            let path = self.local.join(rel);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, contents).await?;
        }
        self.state.checkouts.insert(
            self.local.clone(),
            Checkout {
                remote: self.remote.clone(),
                reference: script.default_branch.clone(),
            },
        );
        Ok(())
    }

    async fn update(&self) -> Result<()> {
        self.enter("update").await;
        self.checked_out().map(|_| ())
    }

    async fn update_version(&self, reference: &str) -> Result<()> {
        self.enter("update_version").await;
        let script = self.script()?;
        if self.resolve(&script, reference).is_none() {
            return Err(GroveError::VcsUpdateVersionFailed {
                reference: reference.to_string(),
                reason: "unknown revision".to_string(),
            }
            .into());
        }
        if let Some(mut checkout) = self.state.checkouts.get_mut(&self.local) {
            checkout.reference = reference.to_string();
        }
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        self.enter("version").await;
        let script = self.script()?;
        let current = self.checked_out()?;
        self.resolve(&script, &current)
            .ok_or_else(|| anyhow::anyhow!("checkout of {} is on an unknown revision", self.remote))
    }

    async fn tags(&self) -> Result<Vec<String>> {
        self.enter("tags").await;
        Ok(self.script()?.tags)
    }

    async fn branches(&self) -> Result<Vec<String>> {
        self.enter("branches").await;
        Ok(self.script()?.branches)
    }

    async fn is_reference(&self, reference: &str) -> Result<bool> {
        self.enter("is_reference").await;
        Ok(self.resolve(&self.script()?, reference).is_some())
    }

    async fn is_dirty(&self) -> Result<bool> {
        self.enter("is_dirty").await;
        Ok(self.state.dirty.contains(&self.local))
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        self.enter("current_branch").await;
        let script = self.script()?;
        let current = self.checked_out()?;
        Ok(script.branches.contains(&current).then_some(current))
    }

    async fn commit_id(&self, reference: &str) -> Result<String> {
        self.enter("commit_id").await;
        self.resolve(&self.script()?, reference)
            .ok_or_else(|| anyhow::anyhow!("unknown revision {reference}"))
    }
}
