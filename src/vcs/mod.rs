//! Version control adapters.
//!
//! grove talks to git, Mercurial, Subversion and Bazaar through their command
//! line clients. The installer only sees two traits:
//!
//! - [`VcsRepo`], one working copy at a known local path with a known remote;
//! - [`VcsProvider`], which decides the backend for a dependency and hands out
//!   [`VcsRepo`] handles.
//!
//! [`CliVcs`] is the provider used by the binary. Tests substitute a scripted
//! provider from `test_utils`.
//!
//! # Backend selection
//!
//! 1. The `vcs` field of the dependency, when set.
//! 2. Metadata directories of an existing checkout (`.git`, `.hg`, `.svn`, `.bzr`).
//! 3. The remote URL: well-known hosts, URL schemes and repository suffixes.
//! 4. `go-import` meta tags served for `?go-get=1`.
//!
//! An existing checkout whose type or remote disagrees with the dependency is
//! reported as [`GroveError::WrongVcs`] or [`GroveError::WrongRemote`].

mod bzr;
pub mod command;
pub mod detect;
pub mod discovery;
mod git;
mod hg;
mod svn;

pub use discovery::{GoImport, ImportDiscovery};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::DEFAULT_COMMAND_TIMEOUT;
use crate::core::GroveError;
use crate::manifest::Dependency;
use command::VcsCommand;

/// The supported version control systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    Git,
    #[serde(alias = "mercurial")]
    Hg,
    #[serde(alias = "subversion")]
    Svn,
    #[serde(alias = "bazaar")]
    Bzr,
}

impl VcsKind {
    pub const ALL: [Self; 4] = [Self::Git, Self::Hg, Self::Svn, Self::Bzr];

    /// Parse a type name, accepting the long aliases. Unknown names give `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "git" => Some(Self::Git),
            "hg" | "mercurial" => Some(Self::Hg),
            "svn" | "subversion" => Some(Self::Svn),
            "bzr" | "bazaar" => Some(Self::Bzr),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Hg => "hg",
            Self::Svn => "svn",
            Self::Bzr => "bzr",
        }
    }

    /// Executable name of the client.
    pub const fn command(self) -> &'static str {
        self.as_str()
    }

    /// Metadata directory marking a checkout of this type.
    pub const fn metadata_dir(self) -> &'static str {
        match self {
            Self::Git => ".git",
            Self::Hg => ".hg",
            Self::Svn => ".svn",
            Self::Bzr => ".bzr",
        }
    }

    /// Whether the backend has a notion of a default branch.
    pub const fn has_branches(self) -> bool {
        matches!(self, Self::Git | Self::Hg)
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VcsKind {
    type Err = GroveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| GroveError::Other {
            message: format!("Unknown VCS type '{s}'"),
        })
    }
}

/// A single working copy.
#[allow(async_fn_in_trait)]
pub trait VcsRepo {
    fn kind(&self) -> VcsKind;
    fn remote(&self) -> &str;
    fn local_path(&self) -> &Path;

    /// Whether a checkout exists at [`local_path`](Self::local_path).
    fn check_local(&self) -> bool {
        self.local_path().join(self.kind().metadata_dir()).exists()
    }

    /// Initial fetch into the local path.
    async fn get(&self) -> Result<()>;
    /// Bring an existing checkout up to date with its remote.
    async fn update(&self) -> Result<()>;
    /// Check out `reference`.
    async fn update_version(&self, reference: &str) -> Result<()>;
    /// The revision currently checked out.
    async fn version(&self) -> Result<String>;
    async fn tags(&self) -> Result<Vec<String>>;
    async fn branches(&self) -> Result<Vec<String>>;
    /// Whether `reference` names a tag, branch or revision known locally.
    async fn is_reference(&self, reference: &str) -> Result<bool>;
    /// Whether the checkout has uncommitted modifications.
    async fn is_dirty(&self) -> Result<bool>;
    /// The checked-out branch, when the backend has branches and HEAD is on one.
    async fn current_branch(&self) -> Result<Option<String>>;
    /// The revision `reference` resolves to.
    async fn commit_id(&self, reference: &str) -> Result<String>;
}

/// Chooses a backend per dependency and opens working copies.
#[allow(async_fn_in_trait)]
pub trait VcsProvider: Send + Sync {
    type Repo: VcsRepo;

    /// Remote lookups shared by everything this provider serves.
    fn discovery(&self) -> &ImportDiscovery;

    /// A handle for `dep` checked out at `local`.
    ///
    /// Nothing is fetched. When `local` already holds a checkout its type and
    /// remote are verified against `dep`.
    async fn open(&self, dep: &Dependency, local: &Path) -> Result<Self::Repo>;
}

/// Provider backed by the installed command line clients.
pub struct CliVcs {
    discovery: ImportDiscovery,
    timeout: Duration,
}

impl CliVcs {
    pub fn new(discovery: ImportDiscovery) -> Self {
        Self {
            discovery,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl VcsProvider for CliVcs {
    type Repo = CliRepo;

    fn discovery(&self) -> &ImportDiscovery {
        &self.discovery
    }

    async fn open(&self, dep: &Dependency, local: &Path) -> Result<CliRepo> {
        let remote = dep.remote();
        let local_kind = detect::detect_local(local);

        let kind = match (dep.vcs, local_kind) {
            (Some(explicit), Some(found)) if explicit != found => {
                return Err(GroveError::WrongVcs {
                    path: local.display().to_string(),
                    expected: explicit.to_string(),
                    found: found.to_string(),
                }
                .into());
            }
            (Some(explicit), _) => explicit,
            (None, Some(found)) => found,
            (None, None) => match detect::detect_remote(&remote) {
                Some(kind) => kind,
                None => self.discovery.detect_vcs(&dep.name, &remote).await?,
            },
        };

        let repo = CliRepo {
            kind,
            remote,
            local: local.to_path_buf(),
            timeout: self.timeout,
            name: dep.name.clone(),
        };

        if repo.check_local()
            && let Some(found) = repo.configured_remote().await?
            && found != repo.remote
        {
            return Err(GroveError::WrongRemote {
                path: local.display().to_string(),
                expected: repo.remote.clone(),
                found,
            }
            .into());
        }

        Ok(repo)
    }
}

/// A working copy driven by a command line client.
#[derive(Debug, Clone)]
pub struct CliRepo {
    kind: VcsKind,
    remote: String,
    local: PathBuf,
    timeout: Duration,
    name: String,
}

impl CliRepo {
    pub fn new(kind: VcsKind, remote: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        let remote = remote.into();
        Self {
            kind,
            name: remote.clone(),
            remote,
            local: local.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// A command for this client running inside the checkout.
    fn cmd(&self) -> VcsCommand {
        VcsCommand::new(self.kind)
            .current_dir(&self.local)
            .with_timeout(Some(self.timeout))
            .with_context(&self.name)
    }

    /// A command for this client running next to the checkout, for the initial fetch.
    fn parent_cmd(&self) -> Result<VcsCommand> {
        let parent = match self.local.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        Ok(VcsCommand::new(self.kind)
            .current_dir(parent)
            .with_timeout(Some(self.timeout))
            .with_context(&self.name))
    }

    fn local_arg(&self) -> String {
        self.local.display().to_string()
    }

    /// The remote recorded in the existing checkout, if the backend reports one.
    async fn configured_remote(&self) -> Result<Option<String>> {
        match self.kind {
            VcsKind::Git => git::remote_url(self).await,
            VcsKind::Hg => hg::remote_url(self).await,
            VcsKind::Svn => svn::remote_url(self).await,
            // bzr rewrites parent URLs, so its recorded remote is not comparable
            VcsKind::Bzr => Ok(None),
        }
    }
}

fn get_failed(remote: &str, err: anyhow::Error) -> anyhow::Error {
    let reason = match err.downcast_ref::<GroveError>() {
        Some(GroveError::VcsCommandError { stderr, .. }) => stderr.trim().to_string(),
        Some(GroveError::VcsNotFound { .. }) => return err,
        _ => err.to_string(),
    };
    GroveError::VcsGetFailed {
        remote: remote.to_string(),
        reason,
    }
    .into()
}

fn update_version_failed(reference: &str, err: anyhow::Error) -> anyhow::Error {
    let reason = match err.downcast_ref::<GroveError>() {
        Some(GroveError::VcsCommandError { stderr, .. }) => stderr.trim().to_string(),
        _ => err.to_string(),
    };
    GroveError::VcsUpdateVersionFailed {
        reference: reference.to_string(),
        reason,
    }
    .into()
}

/// First whitespace-separated column of every non-empty line.
fn first_column(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

impl VcsRepo for CliRepo {
    fn kind(&self) -> VcsKind {
        self.kind
    }

    fn remote(&self) -> &str {
        &self.remote
    }

    fn local_path(&self) -> &Path {
        &self.local
    }

    async fn get(&self) -> Result<()> {
        let result = match self.kind {
            VcsKind::Git => git::get(self).await,
            VcsKind::Hg => hg::get(self).await,
            VcsKind::Svn => svn::get(self).await,
            VcsKind::Bzr => bzr::get(self).await,
        };
        result.map_err(|e| get_failed(&self.remote, e))
    }

    async fn update(&self) -> Result<()> {
        match self.kind {
            VcsKind::Git => git::update(self).await,
            VcsKind::Hg => hg::update(self).await,
            VcsKind::Svn => svn::update(self).await,
            VcsKind::Bzr => bzr::update(self).await,
        }
    }

    async fn update_version(&self, reference: &str) -> Result<()> {
        let result = match self.kind {
            VcsKind::Git => git::update_version(self, reference).await,
            VcsKind::Hg => hg::update_version(self, reference).await,
            VcsKind::Svn => svn::update_version(self, reference).await,
            VcsKind::Bzr => bzr::update_version(self, reference).await,
        };
        result.map_err(|e| update_version_failed(reference, e))
    }

    async fn version(&self) -> Result<String> {
        match self.kind {
            VcsKind::Git => git::version(self).await,
            VcsKind::Hg => hg::version(self).await,
            VcsKind::Svn => svn::version(self).await,
            VcsKind::Bzr => bzr::version(self).await,
        }
    }

    async fn tags(&self) -> Result<Vec<String>> {
        match self.kind {
            VcsKind::Git => git::tags(self).await,
            VcsKind::Hg => hg::tags(self).await,
            VcsKind::Svn => Ok(Vec::new()),
            VcsKind::Bzr => bzr::tags(self).await,
        }
    }

    async fn branches(&self) -> Result<Vec<String>> {
        match self.kind {
            VcsKind::Git => git::branches(self).await,
            VcsKind::Hg => hg::branches(self).await,
            VcsKind::Svn | VcsKind::Bzr => Ok(Vec::new()),
        }
    }

    async fn is_reference(&self, reference: &str) -> Result<bool> {
        match self.kind {
            VcsKind::Git => git::is_reference(self, reference).await,
            VcsKind::Hg => hg::is_reference(self, reference).await,
            VcsKind::Svn => svn::is_reference(self, reference).await,
            VcsKind::Bzr => bzr::is_reference(self, reference).await,
        }
    }

    async fn is_dirty(&self) -> Result<bool> {
        match self.kind {
            VcsKind::Git => git::is_dirty(self).await,
            VcsKind::Hg => hg::is_dirty(self).await,
            VcsKind::Svn => svn::is_dirty(self).await,
            VcsKind::Bzr => bzr::is_dirty(self).await,
        }
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        match self.kind {
            VcsKind::Git => git::current_branch(self).await,
            VcsKind::Hg => hg::current_branch(self).await,
            VcsKind::Svn | VcsKind::Bzr => Ok(None),
        }
    }

    async fn commit_id(&self, reference: &str) -> Result<String> {
        match self.kind {
            VcsKind::Git => git::commit_id(self, reference).await,
            VcsKind::Hg => hg::commit_id(self, reference).await,
            VcsKind::Svn => svn::commit_id(self, reference).await,
            VcsKind::Bzr => bzr::commit_id(self, reference).await,
        }
    }
}
