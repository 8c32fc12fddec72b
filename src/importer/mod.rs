//! Reading the dependency declarations of a fetched package.
//!
//! When a dependency ships its own manifest, the versions it asks for are
//! folded into the run ("flattening"). Besides `grove.yaml` two older Go
//! formats are understood:
//!
//! - Godep, `Godeps/Godeps.json`;
//! - GPM, a plain `Godeps` file with `name [ref]` lines.
//!
//! [`import_dir`] tries the formats in that order and stops at the first hit.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::constants::{LOCK_FILE, MANIFEST_FILE};
use crate::lockfile::Lockfile;
use crate::manifest::{Config, Dependencies, Dependency, DependencyList};
use crate::vcs::detect::root_from_table;

/// A manifest format some other tool writes.
pub trait LegacyImporter {
    fn name(&self) -> &'static str;
    /// Whether `dir` carries this format's manifest.
    fn has(&self, dir: &Path) -> bool;
    fn parse(&self, dir: &Path) -> Result<Dependencies>;
}

/// grove's own `grove.yaml`, with references replaced by locked versions
/// when a current `grove.lock` sits next to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroveImporter;

impl LegacyImporter for GroveImporter {
    fn name(&self) -> &'static str {
        "grove"
    }

    fn has(&self, dir: &Path) -> bool {
        dir.join(MANIFEST_FILE).is_file()
    }

    fn parse(&self, dir: &Path) -> Result<Dependencies> {
        let config = Config::load(&dir.join(MANIFEST_FILE))?;
        let lock = Lockfile::load(&dir.join(LOCK_FILE))?;
        let Some(lock) = lock.filter(|lock| config.hash().is_ok_and(|hash| lock.is_current(&hash))) else {
            return Ok(config.imports);
        };

        let (locked, _) = lock.to_dependencies();
        Ok(config
            .imports
            .into_iter()
            .map(|mut dep| {
                if let Some(pinned) = locked.get_dep(&dep.name) {
                    dep.reference = pinned.reference.clone();
                }
                dep
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Godeps {
    #[serde(default)]
    deps: Vec<GodepEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GodepEntry {
    import_path: String,
    #[serde(default)]
    rev: String,
}

/// Godep's `Godeps/Godeps.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GodepImporter;

impl LegacyImporter for GodepImporter {
    fn name(&self) -> &'static str {
        "Godep"
    }

    fn has(&self, dir: &Path) -> bool {
        dir.join("Godeps").join("Godeps.json").is_file()
    }

    fn parse(&self, dir: &Path) -> Result<Dependencies> {
        let path = dir.join("Godeps").join("Godeps.json");
        let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let godeps: Godeps =
            serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

        let mut deps = Dependencies::new();
        for entry in godeps.deps {
            let (root, sub) = split_package(&entry.import_path);
            match deps.get_dep_mut(&root) {
                Some(dep) => dep.add_subpackage(&sub),
                None => {
                    let mut dep = Dependency::new(root).with_reference(entry.rev);
                    dep.add_subpackage(&sub);
                    deps.push(dep);
                }
            }
        }
        Ok(deps)
    }
}

/// GPM's `Godeps` file.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpmImporter;

impl LegacyImporter for GpmImporter {
    fn name(&self) -> &'static str {
        "GPM"
    }

    fn has(&self, dir: &Path) -> bool {
        // A Godeps directory belongs to Godep
        dir.join("Godeps").is_file()
    }

    fn parse(&self, dir: &Path) -> Result<Dependencies> {
        let path = dir.join("Godeps");
        let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let name = fields.next()?;
                let mut dep = Dependency::new(name);
                if let Some(reference) = fields.next().filter(|r| !r.starts_with('#')) {
                    dep.reference = reference.to_string();
                }
                Some(dep)
            })
            .collect())
    }
}

/// Read whichever manifest `dir` has. Returns whether one was found.
pub fn import_dir(dir: &Path) -> Result<(bool, Dependencies)> {
    let importers: [&dyn LegacyImporter; 3] = [&GroveImporter, &GodepImporter, &GpmImporter];
    for importer in importers {
        if importer.has(dir) {
            info!("Found {} configuration in {}", importer.name(), dir.display());
            return Ok((true, importer.parse(dir)?));
        }
    }
    debug!("No dependency configuration in {}", dir.display());
    Ok((false, Dependencies::new()))
}

/// Split an import path at its repository root, using the well-known host
/// table. Unknown hosts are their own root.
fn split_package(pkg: &str) -> (String, String) {
    let root = root_from_table(pkg).unwrap_or_else(|| pkg.to_string());
    let sub = pkg
        .strip_prefix(root.as_str())
        .map(|rest| rest.trim_start_matches('/').to_string())
        .unwrap_or_default();
    (root, sub)
}
