//! Resolver hooks that fetch into the cache and pin while the import graph
//! is walked.

use anyhow::Result;
use dashmap::DashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{Installer, UpdateTracker};
use crate::cache::cache_key;
use crate::importer::import_dir;
use crate::manifest::{Config, Dependency, DependencyList};
use crate::resolver::{MissingPackageHandler, VersionHandler, normalize_name};
use crate::vcs::VcsProvider;
use crate::version::determine_dependency;

/// Declarations read from dependencies' own manifests, keyed by root.
/// The first declaration of a root wins.
#[derive(Debug, Default)]
pub struct ImportCache {
    deps: DashMap<String, (Dependency, String)>,
}

impl ImportCache {
    /// The declaration of `name` and the root that declared it.
    pub fn get(&self, name: &str) -> Option<(Dependency, String)> {
        self.deps.get(name).map(|entry| entry.value().clone())
    }

    /// Record `dep` as declared by `source`. Returns `false` when a
    /// declaration for the same root already exists.
    pub fn add(&self, dep: Dependency, source: &str) -> bool {
        match self.deps.entry(dep.name.clone()) {
            dashmap::Entry::Occupied(_) => false,
            dashmap::Entry::Vacant(slot) => {
                slot.insert((dep, source.to_string()));
                true
            }
        }
    }

    /// The longest declared root that `pkg` is or lies below.
    pub fn root_of(&self, pkg: &str) -> Option<String> {
        self.deps
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|root| is_under(pkg, root))
            .max_by_key(String::len)
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }
}

fn is_under(pkg: &str, root: &str) -> bool {
    pkg == root || pkg.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
}

/// Split `pkg` into root and subpackage. Roots declared in `config` win,
/// then roots declared by dependencies' manifests, then discovery.
async fn split_root<P: VcsProvider>(
    installer: &Installer<P>,
    imports: &ImportCache,
    config: &Config,
    pkg: &str,
) -> (String, String) {
    let declared = config
        .imports
        .iter()
        .chain(config.dev_imports.iter())
        .any(|dep| is_under(pkg, &dep.name));
    if !declared && let Some(root) = imports.root_of(pkg) {
        let sub = pkg[root.len()..].trim_start_matches('/').to_string();
        return (root, sub);
    }
    normalize_name(installer.vcs().discovery(), config, pkg).await
}

/// Where a package lives in the cache, if its root is declared in `config`.
fn cached_path<P: VcsProvider>(installer: &Installer<P>, config: &Config, pkg: &str) -> Option<PathBuf> {
    let dep = config
        .imports
        .iter()
        .chain(config.dev_imports.iter())
        .filter(|dep| is_under(pkg, &dep.name))
        .max_by_key(|dep| dep.name.len())?;
    let key = cache_key(&dep.remote()).ok()?;
    let sub = pkg[dep.name.len()..].trim_start_matches('/');
    let base = installer.cache().src_path(&key);
    Some(if sub.is_empty() { base } else { base.join(sub) })
}

/// Fetches unknown packages into the cache and adds them to the manifest.
pub struct InstallerMissingHandler<'a, P> {
    installer: &'a Installer<P>,
    tracker: &'a UpdateTracker,
    imports: &'a ImportCache,
}

impl<'a, P: VcsProvider> InstallerMissingHandler<'a, P> {
    pub const fn new(installer: &'a Installer<P>, tracker: &'a UpdateTracker, imports: &'a ImportCache) -> Self {
        Self {
            installer,
            tracker,
            imports,
        }
    }

    async fn fetch_to_cache(&self, config: &mut Config, pkg: &str, add_test: bool) -> Result<bool> {
        let (root, _) = split_root(self.installer, self.imports, config, pkg).await;
        if root == config.name {
            return Ok(false);
        }

        let declared = config
            .imports
            .get_dep(&root)
            .or_else(|| config.dev_imports.get_dep(&root))
            .cloned();
        let dep = match declared {
            Some(dep) => dep,
            None => {
                let dep = self
                    .imports
                    .get(&root)
                    .map(|(dep, _)| dep)
                    .unwrap_or_else(|| Dependency::new(&root));
                debug!("Adding {} to the manifest", root);
                if add_test {
                    config.dev_imports.push(dep.clone());
                } else {
                    config.imports.push(dep.clone());
                }
                dep
            }
        };

        let dest = self.installer.cache().src_path(&cache_key(&dep.remote())?);
        if dest.exists() {
            return Ok(true);
        }
        info!("Fetching {} into the cache", pkg);
        self.installer.vcs_update(&dep, self.tracker).await?;
        Ok(dest.exists())
    }
}

impl<P: VcsProvider> MissingPackageHandler for InstallerMissingHandler<'_, P> {
    async fn not_found(&mut self, config: &mut Config, pkg: &str, add_test: bool) -> Result<bool> {
        self.fetch_to_cache(config, pkg, add_test).await
    }

    /// Packages on `GOPATH` are still vendored from the cache.
    async fn on_gopath(&mut self, config: &mut Config, pkg: &str, add_test: bool) -> Result<bool> {
        self.fetch_to_cache(config, pkg, add_test).await
    }

    async fn in_vendor(&mut self, config: &mut Config, pkg: &str, add_test: bool) -> Result<bool> {
        self.fetch_to_cache(config, pkg, add_test).await
    }

    fn pkg_path(&self, config: &Config, pkg: &str) -> PathBuf {
        cached_path(self.installer, config, pkg).unwrap_or_else(|| self.installer.context().vendor_dir().join(pkg))
    }
}

/// Flattens dependencies' own manifests into the run and pins packages as
/// they are discovered.
pub struct InstallerVersionHandler<'a, P> {
    installer: &'a Installer<P>,
    imports: &'a ImportCache,
    /// Roots whose manifests were already read.
    imported: HashSet<String>,
}

impl<'a, P: VcsProvider> InstallerVersionHandler<'a, P> {
    pub fn new(installer: &'a Installer<P>, imports: &'a ImportCache) -> Self {
        Self {
            installer,
            imports,
            imported: HashSet::new(),
        }
    }
}

impl<P: VcsProvider> VersionHandler for InstallerVersionHandler<'_, P> {
    async fn process(&mut self, config: &mut Config, pkg: &str) -> Result<()> {
        let (root, _) = split_root(self.installer, self.imports, config, pkg).await;
        if root == config.name || !self.imported.insert(root.clone()) {
            return Ok(());
        }
        let Some(path) = cached_path(self.installer, config, &root) else {
            return Ok(());
        };

        let (found, deps) = tokio::task::spawn_blocking(move || import_dir(&path)).await??;
        if !found {
            return Ok(());
        }
        for dep in deps {
            if dep.reference.is_empty() && dep.repository.is_empty() {
                continue;
            }
            let name = dep.name.clone();
            if self.imports.add(dep, &root) {
                debug!("{} declares {}", root, name);
            }
        }
        Ok(())
    }

    async fn set_version(&mut self, config: &mut Config, pkg: &str, add_test: bool) -> Result<()> {
        let (root, sub) = split_root(self.installer, self.imports, config, pkg).await;
        if root == config.name {
            return Ok(());
        }
        let declared = self.imports.get(&root);

        let in_imports = config.imports.has(&root);
        let existing = if in_imports {
            config.imports.get_dep(&root)
        } else if add_test {
            config.dev_imports.get_dep(&root)
        } else {
            None
        };

        let mut chosen = match (existing.cloned(), declared) {
            (Some(mut have), Some((want, source))) => {
                if have.reference.is_empty() && !want.reference.is_empty() {
                    have.reference = want.reference;
                    have.pin.clear();
                    have
                } else if !have.reference.is_empty() && !want.reference.is_empty() && have.reference != want.reference {
                    let key = cache_key(&have.remote())?;
                    let dest = self.installer.cache().src_path(&key);
                    let _lock = self.installer.cache().lock(&key).await?;
                    let repo = self.installer.vcs().open(&have, &dest).await?;
                    let mut picked =
                        determine_dependency(&repo, &have, &want, &source, self.installer.operations()).await;
                    if picked.reference != have.reference {
                        picked.pin.clear();
                    }
                    picked
                } else {
                    have
                }
            }
            (Some(have), None) => have,
            (None, Some((want, _))) => want,
            (None, None) => Dependency::new(&root),
        };
        chosen.add_subpackage(&sub);

        let list = if add_test && !in_imports {
            &mut config.dev_imports
        } else {
            &mut config.imports
        };
        let index = match list.iter().position(|d| d.name == root) {
            Some(index) => {
                let slot = &mut list[index];
                let subs = std::mem::take(&mut slot.subpackages);
                *slot = chosen;
                for sub in subs {
                    slot.add_subpackage(&sub);
                }
                index
            }
            None => {
                list.push(chosen);
                list.len() - 1
            }
        };

        let slot = &mut list[index];
        let reference = slot.reference.clone();
        if let Err(e) = self.installer.pin_dependency(slot).await {
            warn!("Unable to set version on {} to {}: {:#}", root, reference, e);
            return Err(e);
        }
        Ok(())
    }
}
