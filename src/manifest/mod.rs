//! The project manifest, `grove.yaml`.
//!
//! A manifest names the project's root import path and lists the third-party
//! packages it needs:
//!
//! ```yaml
//! package: github.com/acme/widget
//! ignore:
//!   - github.com/acme/internal
//! excludeDirs:
//!   - fixtures
//! import:
//!   - package: github.com/pkg/errors
//!     version: ^0.8.0
//!   - package: golang.org/x/sys
//!     repo: https://go.googlesource.com/sys
//!     vcs: git
//!     subpackages:
//!       - unix
//!     os:
//!       - linux
//! devimport:
//!   - package: github.com/stretchr/testify
//!     version: v1.2.2
//! ```
//!
//! Loading a manifest always de-duplicates it: repeated declarations of the
//! same root merge their subpackages, and repeated declarations that disagree
//! on anything else are rejected with [`GroveError::DuplicateImport`].
//!
//! [`Config::hash`] is the content hash recorded in the lock file; it ignores
//! the order of imports, subpackages and platform filters.

mod dependency;

pub use dependency::{Dependencies, Dependency, DependencyList};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::core::GroveError;
use crate::utils::fs::atomic_write;

/// A parsed `grove.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root import path of the project itself.
    #[serde(rename = "package", default)]
    pub name: String,

    /// Packages never fetched. Matches the entry and everything below it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,

    /// Project directories the import scan skips.
    #[serde(rename = "excludeDirs", default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_dirs: Vec<String>,

    #[serde(rename = "import", default)]
    pub imports: Dependencies,

    #[serde(
        rename = "devimport",
        alias = "testImport",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub dev_imports: Dependencies,
}

impl Config {
    /// An empty manifest for the project `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse manifest YAML and de-duplicate it.
    pub fn from_yaml(yaml: &str) -> Result<Self, GroveError> {
        let mut config: Self = serde_yaml::from_str(yaml).map_err(|e| {
            GroveError::ManifestParseError {
                file: crate::constants::MANIFEST_FILE.to_string(),
                reason: e.to_string(),
            }
        })?;
        config.dedupe()?;
        Ok(config)
    }

    /// Serialize to YAML. The output is de-duplicated; `self` is not modified.
    pub fn to_yaml(&self) -> Result<String, GroveError> {
        let mut copy = self.clone();
        copy.dedupe()?;
        serde_yaml::to_string(&copy).map_err(|e| GroveError::Other {
            message: format!("Failed to serialize manifest: {e}"),
        })
    }

    /// Read a manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GroveError::ManifestNotFound.into());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::from_yaml(&content).map_err(|e| match e {
            GroveError::ManifestParseError { reason, .. } => GroveError::ManifestParseError {
                file: path.display().to_string(),
                reason,
            }
            .into(),
            other => anyhow::Error::from(other),
        })
    }

    /// Write the manifest to disk atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;
        atomic_write(path, yaml.as_bytes())
            .with_context(|| format!("Failed to write manifest {}", path.display()))
    }

    /// Merge duplicate declarations and drop self-imports and ignored imports.
    pub fn dedupe(&mut self) -> Result<(), GroveError> {
        self.imports = std::mem::take(&mut self.imports).dedupe()?;
        self.dev_imports = std::mem::take(&mut self.dev_imports).dedupe()?;

        let name = self.name.clone();
        let ignore = self.ignore.clone();
        let keep = |dep: &Dependency| dep.name != name && !ignore.contains(&dep.name);
        self.imports.retain(keep);
        self.dev_imports.retain(keep);
        Ok(())
    }

    /// Whether `name` is ignored, directly or as a subpackage of an ignored path.
    pub fn has_ignore(&self, name: &str) -> bool {
        self.ignore.iter().any(|ignored| {
            name == ignored
                || name
                    .strip_prefix(ignored.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Whether `name` is listed as an import or a dev import.
    pub fn has_dependency(&self, name: &str) -> bool {
        self.imports.has(name) || self.dev_imports.has(name)
    }

    /// Append dependencies to the import list, de-duplicating as it goes.
    pub fn add_import(&mut self, deps: impl IntoIterator<Item = Dependency>) -> Result<(), GroveError> {
        let mut all = std::mem::take(&mut self.imports);
        all.extend(deps);
        self.imports = all.dedupe()?;
        Ok(())
    }

    /// SHA-256 over the canonical form of the manifest, hex-encoded.
    ///
    /// The canonical form sorts imports, dev imports and every dependency's
    /// subpackage and platform lists, so reordering any of them does not
    /// change the hash.
    pub fn hash(&self) -> Result<String, GroveError> {
        let mut canonical = self.clone();
        canonical.dedupe()?;
        canonical.ignore.sort();
        canonical.exclude_dirs.sort();
        for list in [&mut canonical.imports, &mut canonical.dev_imports] {
            list.sort_by(|a, b| a.name.cmp(&b.name));
            for dep in list.iter_mut() {
                dep.subpackages.sort();
                dep.os.sort();
                dep.arch.sort();
            }
        }
        let yaml = serde_yaml::to_string(&canonical).map_err(|e| GroveError::Other {
            message: format!("Failed to serialize manifest for hashing: {e}"),
        })?;
        Ok(hex::encode(Sha256::digest(yaml.as_bytes())))
    }
}
