use serde::{Deserialize, Serialize};

use crate::core::GroveError;
use crate::lockfile::Lock;
use crate::vcs::VcsKind;

/// One package the project depends on, identified by its root import path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDependency", into = "RawDependency")]
pub struct Dependency {
    /// Root import path. Never a subpackage path.
    pub name: String,
    /// Exact reference, semver constraint, or empty for the default branch.
    pub reference: String,
    /// Remote URL override. Empty means `https://<name>`.
    pub repository: String,
    pub vcs: Option<VcsKind>,
    pub subpackages: Vec<String>,
    pub arch: Vec<String>,
    pub os: Vec<String>,
    /// Concrete revision chosen during installation. Never serialized.
    pub pin: String,
}

pub type Dependencies = Vec<Dependency>;

/// Name-keyed operations on a list of dependencies.
pub trait DependencyList {
    fn has(&self, name: &str) -> bool;
    fn get_dep(&self, name: &str) -> Option<&Dependency>;
    fn get_dep_mut(&mut self, name: &str) -> Option<&mut Dependency>;
    /// Remove the entry named `name`, returning it.
    fn remove_dep(&mut self, name: &str) -> Option<Dependency>;
    /// Collapse repeated names, unioning subpackages and rejecting conflicts.
    fn dedupe(self) -> Result<Dependencies, GroveError>;
}

impl DependencyList for Dependencies {
    fn has(&self, name: &str) -> bool {
        self.iter().any(|d| d.name == name)
    }

    fn get_dep(&self, name: &str) -> Option<&Dependency> {
        self.iter().find(|d| d.name == name)
    }

    fn get_dep_mut(&mut self, name: &str) -> Option<&mut Dependency> {
        self.iter_mut().find(|d| d.name == name)
    }

    fn remove_dep(&mut self, name: &str) -> Option<Dependency> {
        let index = self.iter().position(|d| d.name == name)?;
        Some(self.remove(index))
    }

    fn dedupe(self) -> Result<Dependencies, GroveError> {
        let mut out: Dependencies = Vec::with_capacity(self.len());
        for dep in self {
            match out.get_dep_mut(&dep.name) {
                None => out.push(dep),
                Some(existing) => {
                    existing.check_same_intent(&dep)?;
                    for sub in dep.subpackages {
                        existing.add_subpackage(&sub);
                    }
                }
            }
        }
        Ok(out)
    }
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    #[must_use]
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    /// Rebuild a dependency from a lock entry, using the locked version as
    /// the reference.
    pub fn from_lock(lock: &Lock) -> Self {
        Self {
            name: lock.name.clone(),
            reference: lock.version.clone(),
            repository: lock.repository.clone(),
            vcs: lock.vcs,
            subpackages: lock.subpackages.clone(),
            arch: lock.arch.clone(),
            os: lock.os.clone(),
            pin: String::new(),
        }
    }

    /// The URL to fetch from.
    pub fn remote(&self) -> String {
        if self.repository.is_empty() {
            format!("https://{}", self.name)
        } else {
            self.repository.clone()
        }
    }

    pub fn has_subpackage(&self, sub: &str) -> bool {
        self.subpackages.iter().any(|s| s == sub)
    }

    /// Add `sub` unless it is already present. Empty and `.` mean the root.
    pub fn add_subpackage(&mut self, sub: &str) {
        if sub.is_empty() || sub == "." || self.has_subpackage(sub) {
            return;
        }
        self.subpackages.push(sub.to_string());
    }

    /// Whether this dependency applies to `goos`/`goarch`. Empty filters match everything.
    pub fn matches_platform(&self, goos: &str, goarch: &str) -> bool {
        (self.os.is_empty() || self.os.iter().any(|o| o == goos))
            && (self.arch.is_empty() || self.arch.iter().any(|a| a == goarch))
    }

    fn check_same_intent(&self, other: &Self) -> Result<(), GroveError> {
        let conflict = |reason: String| GroveError::DuplicateImport {
            name: self.name.clone(),
            reason,
        };
        if self.reference != other.reference {
            return Err(conflict(format!(
                "versions '{}' and '{}'",
                self.reference, other.reference
            )));
        }
        if self.repository != other.repository {
            return Err(conflict("Repository details".to_string()));
        }
        if self.vcs != other.vcs {
            return Err(conflict("VCS types".to_string()));
        }
        if !same_set(&self.os, &other.os) || !same_set(&self.arch, &other.arch) {
            return Err(conflict("OS or Architecture filtering".to_string()));
        }
        Ok(())
    }
}

fn same_set(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    a.dedup();
    b.sort();
    b.dedup();
    a == b
}

/// The on-disk shape of a dependency.
///
/// `ref` is the older spelling of `version` and is read only when `version`
/// is absent. Unknown `vcs` values are dropped so detection runs instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawDependency {
    package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(rename = "ref", default, skip_serializing)]
    legacy_ref: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vcs: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    subpackages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    os: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    arch: Vec<String>,
}

impl From<RawDependency> for Dependency {
    fn from(raw: RawDependency) -> Self {
        let reference = raw
            .version
            .filter(|v| !v.is_empty())
            .or(raw.legacy_ref)
            .unwrap_or_default();
        let mut dep = Self {
            name: raw.package.replace('\\', "/"),
            reference,
            repository: raw.repo,
            vcs: raw.vcs.as_deref().and_then(VcsKind::parse),
            subpackages: Vec::new(),
            arch: raw.arch,
            os: raw.os,
            pin: String::new(),
        };
        for sub in &raw.subpackages {
            dep.add_subpackage(&sub.replace('\\', "/"));
        }
        dep
    }
}

impl From<Dependency> for RawDependency {
    fn from(dep: Dependency) -> Self {
        Self {
            package: dep.name,
            version: (!dep.reference.is_empty()).then_some(dep.reference),
            legacy_ref: None,
            repo: dep.repository,
            vcs: dep.vcs.map(|v| v.as_str().to_string()),
            subpackages: dep.subpackages,
            os: dep.os,
            arch: dep.arch,
        }
    }
}
