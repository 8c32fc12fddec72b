//! The shared repository cache.
//!
//! Every dependency is fetched once into a working copy under the grove home
//! and exported from there into each project's `vendor/`. Working copies are
//! keyed by their normalized remote URL, so two projects using the same
//! remote share one checkout.
//!
//! # Cache Directory Structure
//!
//! ```text
//! ~/.grove/cache/
//! ├── src/                              # VCS working copies
//! │   └── https-github.com-pkg-errors/
//! ├── info/                             # Sidecar metadata per key
//! │   └── https-github.com-pkg-errors.json
//! └── .locks/                           # Advisory lock files
//!     └── https-github.com-pkg-errors.lock
//! ```
//!
//! The sidecar records `{"default-branch": "...", "last-update": "..."}`.
//!
//! # Locking Strategy
//!
//! ```text
//! Worker A: lock("https-github.com-a-b") ───┐
//!                                           ├─── BLOCKS: same key
//! Process B: lock("https-github.com-a-b") ──┘
//!
//! Worker C: lock("https-github.com-c-d") ──── CONCURRENT: different key
//! ```
//!
//! Entries are never evicted; [`Cache::clear`] is the only way to drop them.

pub mod lock;

pub use lock::CacheLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

use crate::core::{GroveContext, GroveError};
use crate::vcs::{ImportDiscovery, VcsKind};

static SCP_REMOTE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9_]+)@([a-zA-Z0-9._-]+):(.*)$").ok());

/// Metadata kept next to a cached working copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoData {
    #[serde(rename = "default-branch", default)]
    pub default_branch: String,
    #[serde(rename = "last-update", default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Filesystem-safe cache key of a remote URL.
///
/// The key is the scheme, user, host and path of the remote joined with `-`.
/// SCP-style remotes (`git@host:path`) have no scheme component.
///
/// ```rust
/// use grove::cache::cache_key;
///
/// assert_eq!(cache_key("https://github.com/foo/bar").unwrap(), "https-github.com-foo-bar");
/// assert_eq!(cache_key("git@github.com:foo/bar").unwrap(), "git-github.com-foo-bar");
/// ```
pub fn cache_key(remote: &str) -> Result<String, GroveError> {
    let invalid = |reason: &str| GroveError::CacheKeyError {
        url: remote.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = remote.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty remote"));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(invalid("remote contains control characters"));
    }

    let mut key = String::new();
    if let Some(re) = SCP_REMOTE.as_ref()
        && !trimmed.contains("://")
        && let Some(caps) = re.captures(trimmed)
    {
        key.push_str(&caps[1]);
        key.push('-');
        key.push_str(&caps[2]);
        key.push('/');
        key.push_str(caps[3].trim_start_matches('/'));
    } else {
        let without_fragment = trimmed.split(['?', '#']).next().unwrap_or_default();
        let (scheme, rest) = match without_fragment.split_once("://") {
            Some((scheme, rest)) => (Some(scheme), rest),
            None => (None, without_fragment),
        };
        let (authority, path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, ""),
        };
        let (user, host) = match authority.rsplit_once('@') {
            // Passwords never end up in a directory name
            Some((userinfo, host)) => (userinfo.split(':').next(), host),
            None => (None, authority),
        };
        if host.is_empty() && path.trim_matches('/').is_empty() {
            return Err(invalid("remote has no host or path"));
        }

        if let Some(scheme) = scheme.filter(|s| !s.is_empty()) {
            key.push_str(&scheme.to_ascii_lowercase());
            key.push('-');
        }
        if let Some(user) = user.filter(|u| !u.is_empty()) {
            key.push_str(user);
            key.push('-');
        }
        key.push_str(host);
        key.push_str(path);
    }

    let key: String = key
        .trim_end_matches('/')
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            other => other,
        })
        .collect();

    if key.is_empty() || key.chars().all(|c| c == '-' || c == '.') {
        return Err(invalid("remote has no host or path"));
    }
    Ok(key)
}

/// Handle on the cache root.
#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    /// The cache of the grove home in `ctx`.
    pub fn new(ctx: &GroveContext) -> Self {
        Self {
            dir: ctx.cache_dir(),
        }
    }

    /// A cache rooted at `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache root.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.dir
    }

    /// Create `cache/`, `cache/src` and `cache/info`. Safe to call repeatedly.
    pub async fn setup(&self) -> Result<()> {
        for dir in [self.dir.clone(), self.dir.join("src"), self.dir.join("info")] {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Working copy directory for `key`.
    pub fn src_path(&self, key: &str) -> PathBuf {
        self.dir.join("src").join(key)
    }

    /// Sidecar metadata file for `key`.
    pub fn info_path(&self, key: &str) -> PathBuf {
        self.dir.join("info").join(format!("{key}.json"))
    }

    /// Exclusive access to `key` until the guard drops.
    pub async fn lock(&self, key: &str) -> Result<CacheLock> {
        CacheLock::acquire(&self.dir, key).await
    }

    /// Sidecar metadata for `key`. A missing sidecar reads as the default.
    pub async fn repo_data(&self, key: &str) -> Result<RepoData> {
        let path = self.info_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RepoData::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read cache metadata {}", path.display()));
            }
        };
        serde_json::from_str(&content).with_context(|| format!("Invalid cache metadata in {}", path.display()))
    }

    /// Persist sidecar metadata for `key`, stamping `last-update` with the current time.
    pub async fn save_repo_data(&self, key: &str, data: &RepoData) -> Result<()> {
        let mut data = data.clone();
        data.last_update = Some(Utc::now());

        let path = self.info_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&data)?;
        let write_path = path.clone();
        tokio::task::spawn_blocking(move || crate::utils::atomic_write(&write_path, json.as_bytes()))
            .await
            .context("spawn_blocking panicked")?
            .with_context(|| format!("Failed to write cache metadata {}", path.display()))?;
        debug!(key = %key, default_branch = %data.default_branch, "Saved cache metadata");
        Ok(())
    }

    /// Default branch of the repository cached under `key`.
    ///
    /// The sidecar is consulted first, then the hosting service. A branch
    /// learned from the hosting service is written back to the sidecar.
    /// Subversion and Bazaar have no default branch.
    pub async fn default_branch(
        &self,
        key: &str,
        kind: VcsKind,
        remote: &str,
        discovery: &ImportDiscovery,
    ) -> Result<Option<String>> {
        if !kind.has_branches() {
            return Ok(None);
        }

        let mut data = self.repo_data(key).await?;
        if !data.default_branch.is_empty() {
            return Ok(Some(data.default_branch));
        }

        match discovery.hosted_default_branch(remote).await {
            Some(branch) => {
                data.default_branch = branch.clone();
                self.save_repo_data(key, &data).await?;
                Ok(Some(branch))
            }
            None => Ok(None),
        }
    }

    /// Remove everything in the cache and recreate the empty layout.
    pub async fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            tokio::fs::remove_dir_all(&self.dir)
                .await
                .with_context(|| format!("Failed to clear cache at {}", self.dir.display()))?;
        }
        self.setup().await
    }
}
