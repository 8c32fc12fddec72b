//! The lock file, `grove.lock`.
//!
//! A lock records the exact revision installed for every dependency together
//! with the manifest hash it was produced from:
//!
//! ```yaml
//! hash: 0c1f...e9
//! updated: 2024-05-01T10:00:00Z
//! imports:
//!   - name: github.com/pkg/errors
//!     version: 645ef00459ed84a119197bfb8d8205042c6df63d
//!   - name: golang.org/x/sys
//!     version: 7dca6fe1f43775aa6d1334576870ff63f978f539
//!     repo: https://go.googlesource.com/sys
//!     vcs: git
//!     subpackages:
//!       - unix
//! devImports: []
//! ```
//!
//! When `hash` differs from the current [`Config::hash`] the lock is stale.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::core::GroveError;
use crate::manifest::{Config, Dependency};
use crate::utils::fs::atomic_write;
use crate::vcs::VcsKind;

/// One locked dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub name: String,
    pub version: String,
    #[serde(rename = "repo", default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subpackages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arch: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<String>,
}

impl Lock {
    /// Snapshot a dependency. The pin wins over the declared reference.
    pub fn from_dependency(dep: &Dependency) -> Self {
        let version = if dep.pin.is_empty() {
            dep.reference.clone()
        } else {
            dep.pin.clone()
        };
        let mut subpackages = dep.subpackages.clone();
        subpackages.sort();
        Self {
            name: dep.name.clone(),
            version,
            repository: dep.repository.clone(),
            vcs: dep.vcs,
            subpackages,
            arch: dep.arch.clone(),
            os: dep.os.clone(),
        }
    }
}

/// A parsed `grove.lock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub hash: String,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub imports: Vec<Lock>,
    #[serde(rename = "devImports", alias = "testImports", default)]
    pub dev_imports: Vec<Lock>,
}

impl Lockfile {
    /// Build a lock from resolved imports and dev imports.
    ///
    /// Entries keep the order given. A dev import that is also a regular
    /// import is dropped from the dev list, unless the two disagree on the
    /// reference, which is an error.
    pub fn new(imports: &[Dependency], dev_imports: &[Dependency], hash: impl Into<String>) -> Result<Self, GroveError> {
        let mut lock = Self {
            hash: hash.into(),
            updated: Utc::now(),
            imports: imports.iter().map(Lock::from_dependency).collect(),
            dev_imports: Vec::new(),
        };

        for dev in dev_imports {
            match imports.iter().find(|d| d.name == dev.name) {
                Some(import) if import.reference != dev.reference => {
                    return Err(GroveError::DevImportConflict {
                        name: dev.name.clone(),
                        import_ref: import.reference.clone(),
                        dev_ref: dev.reference.clone(),
                    });
                }
                Some(_) => {}
                None => lock.dev_imports.push(Lock::from_dependency(dev)),
            }
        }

        Ok(lock)
    }

    /// Build a lock from a resolved manifest.
    pub fn from_config(config: &Config) -> Result<Self, GroveError> {
        Self::new(&config.imports, &config.dev_imports, config.hash()?)
    }

    /// Whether the lock was produced from a manifest with this hash.
    pub fn is_current(&self, config_hash: &str) -> bool {
        self.hash == config_hash
    }

    /// Hash of the lock contents without the `updated` timestamp.
    ///
    /// Two locks with the same fingerprint pin the same revisions regardless
    /// of when they were written or the order of their entries.
    pub fn fingerprint(&self) -> Result<String, GroveError> {
        let mut copy = self.clone();
        copy.updated = DateTime::<Utc>::UNIX_EPOCH;
        copy.imports.sort_by(|a, b| a.name.cmp(&b.name));
        copy.dev_imports.sort_by(|a, b| a.name.cmp(&b.name));
        let yaml = serde_yaml::to_string(&copy).map_err(|e| GroveError::Other {
            message: format!("Failed to serialize lock file: {e}"),
        })?;
        Ok(hex::encode(Sha256::digest(yaml.as_bytes())))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, GroveError> {
        serde_yaml::from_str(yaml).map_err(|e| GroveError::LockfileParseError {
            file: crate::constants::LOCK_FILE.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn to_yaml(&self) -> Result<String, GroveError> {
        serde_yaml::to_string(self).map_err(|e| GroveError::Other {
            message: format!("Failed to serialize lock file: {e}"),
        })
    }

    /// Read a lock file. `Ok(None)` when it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lock file {}", path.display()))?;
        let lock = Self::from_yaml(&content).map_err(|e| match e {
            GroveError::LockfileParseError { reason, .. } => GroveError::LockfileParseError {
                file: path.display().to_string(),
                reason,
            },
            other => other,
        })?;
        Ok(Some(lock))
    }

    /// Write the lock file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;
        atomic_write(path, yaml.as_bytes())
            .with_context(|| format!("Failed to write lock file {}", path.display()))
    }

    /// The locked entries as dependencies pinned to their locked versions.
    pub fn to_dependencies(&self) -> (Vec<Dependency>, Vec<Dependency>) {
        let convert = |locks: &[Lock]| locks.iter().map(Dependency::from_lock).collect();
        (convert(&self.imports), convert(&self.dev_imports))
    }
}
