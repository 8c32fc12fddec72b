//! Import graph resolution for Go projects.
//!
//! The resolver discovers the flattened set of third-party packages a
//! project needs by reading Go source statically. Nothing is compiled and
//! no `go` tooling is required beyond locating `GOROOT`.
//!
//! # Resolution Process
//!
//! 1. [`Resolver::resolve_local`] walks the project tree, skipping `vendor`,
//!    `testdata`, `_`/`.` directories and `excludeDirs`, and collects every
//!    import. Imports from `_test.go` files are kept apart.
//! 2. Each import is classified by [`Resolver::find_pkg`].
//! 3. In deep mode the external imports are queued and scanned in turn.
//!    Packages that cannot be found are handed to a
//!    [`MissingPackageHandler`], which may fetch them and ask for a rescan.
//! 4. Every package taken off the queue is reported to a [`VersionHandler`].
//! 5. The packages reached are folded back into the manifest as
//!    `(root, subpackage)` pairs.
//!
//! # Classification
//!
//! | Import                              | Location   |
//! |-------------------------------------|------------|
//! | `C`                                 | `Cgo`      |
//! | `./x`, `../x`                       | `Relative` |
//! | `appengine`, `appengine_internal/…` | `Appengine`|
//! | below the project's own name        | `Local`    |
//! | `<project>/vendor/<name>` exists    | `Vendor`   |
//! | `<GOPATH>/src/<name>` exists        | `Gopath`   |
//! | `<GOROOT>/src/<name>` exists        | `Goroot`   |
//! | first element has no dot            | `Goroot`   |
//! | anything else                       | `Unknown`  |
//!
//! Results are memoized for the life of the resolver, except `Unknown`: a
//! handler may fetch the package later in the same run.
//!
//! # All-files mode
//!
//! With `resolve_all_files` each dependency's whole tree is scanned rather
//! than only the packages that are imported, which catches imports hidden
//! behind platform-specific files of packages the project never names.

pub mod build;
pub mod handlers;
pub mod scanner;

pub use build::BuildContext;
pub use handlers::{DefaultMissingPackageHandler, DefaultVersionHandler, MissingPackageHandler, VersionHandler};
pub use scanner::{PackageScan, scan_dir};

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::GroveContext;
use crate::manifest::{Config, Dependency, DependencyList};
use crate::vcs::ImportDiscovery;

/// Where an import was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PkgLoc {
    Unknown,
    Local,
    Vendor,
    Gopath,
    Goroot,
    Cgo,
    Appengine,
    Relative,
}

/// Classification of one import path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgInfo {
    pub name: String,
    /// Directory holding the package, when it is on disk.
    pub path: Option<PathBuf>,
    pub loc: PkgLoc,
}

/// Walks the import graph of one project. Owned by a single run.
pub struct Resolver<'a, M, V> {
    handler: M,
    version_handler: V,
    discovery: &'a ImportDiscovery,
    basedir: PathBuf,
    vendor_dir: PathBuf,
    build: BuildContext,
    resolve_test: bool,
    resolve_all_files: bool,
    find_cache: HashMap<String, PkgInfo>,
    already_q: HashSet<String>,
    /// Packages a handler already tried to fetch.
    fetched: HashSet<String>,
    /// Packages scanned successfully, including those with no Go source.
    scanned: HashSet<String>,
}

impl<'a, M: MissingPackageHandler, V: VersionHandler> Resolver<'a, M, V> {
    pub fn new(ctx: &GroveContext, discovery: &'a ImportDiscovery, handler: M, version_handler: V) -> Self {
        Self {
            handler,
            version_handler,
            discovery,
            basedir: ctx.project_dir().to_path_buf(),
            vendor_dir: ctx.vendor_dir().to_path_buf(),
            build: BuildContext::from_env(),
            resolve_test: ctx.resolve_test(),
            resolve_all_files: ctx.resolve_all_files(),
            find_cache: HashMap::new(),
            already_q: HashSet::new(),
            fetched: HashSet::new(),
            scanned: HashSet::new(),
        }
    }

    #[must_use]
    pub fn with_build_context(mut self, build: BuildContext) -> Self {
        self.build = build;
        self.find_cache.clear();
        self
    }

    pub const fn handler(&self) -> &M {
        &self.handler
    }

    pub const fn version_handler(&self) -> &V {
        &self.version_handler
    }

    pub fn into_handlers(self) -> (M, V) {
        (self.handler, self.version_handler)
    }

    /// Classify `name`. See the module docs for the precedence.
    pub fn find_pkg(&mut self, config: &Config, name: &str) -> PkgInfo {
        if let Some(hit) = self.find_cache.get(name) {
            return hit.clone();
        }

        let info = self.classify(config, name);
        if info.loc != PkgLoc::Unknown {
            self.find_cache.insert(name.to_string(), info.clone());
        }
        info
    }

    fn classify(&self, config: &Config, name: &str) -> PkgInfo {
        let found = |loc: PkgLoc, path: Option<PathBuf>| PkgInfo {
            name: name.to_string(),
            path,
            loc,
        };

        if name == "C" {
            return found(PkgLoc::Cgo, None);
        }
        if name.starts_with("./") || name.starts_with("../") {
            return found(PkgLoc::Relative, None);
        }
        if is_under(name, "appengine") || is_under(name, "appengine_internal") {
            return found(PkgLoc::Appengine, None);
        }
        if !config.name.is_empty() && is_under(name, &config.name) {
            return found(PkgLoc::Local, None);
        }

        let vendored = self.vendor_dir.join(name);
        if vendored.is_dir() {
            return found(PkgLoc::Vendor, Some(vendored));
        }
        for entry in &self.build.gopath {
            let candidate = entry.join("src").join(name);
            if candidate.is_dir() {
                return found(PkgLoc::Gopath, Some(candidate));
            }
        }
        if let Some(goroot) = &self.build.goroot {
            let candidate = goroot.join("src").join(name);
            if candidate.is_dir() {
                return found(PkgLoc::Goroot, Some(candidate));
            }
        }
        let first = name.split('/').next().unwrap_or(name);
        if !first.contains('.') {
            return found(PkgLoc::Goroot, None);
        }
        found(PkgLoc::Unknown, None)
    }

    /// Imports of the project itself, as `(imports, test_imports)`.
    ///
    /// Shallow mode returns the external imports seen in the project tree.
    /// Deep mode follows them transitively and merges everything reached
    /// into `config`. Test imports are only collected when the context asks
    /// for them.
    pub async fn resolve_local(&mut self, config: &mut Config, deep: bool) -> Result<(Vec<String>, Vec<String>)> {
        let basedir = self.basedir.clone();
        let exclude = config.exclude_dirs.clone();
        let scans = tokio::task::spawn_blocking(move || scan_tree(&basedir, &exclude))
            .await
            .context("Project scan task failed")??;

        let mut imports = BTreeSet::new();
        let mut test_imports = BTreeSet::new();
        for scan in scans {
            imports.extend(scan.imports);
            test_imports.extend(scan.test_imports);
        }
        test_imports.retain(|imp| !imports.contains(imp));

        let deps = self.external(config, imports);
        let test_deps = if self.resolve_test {
            self.external(config, test_imports)
        } else {
            Vec::new()
        };
        debug!(
            "Project imports {} external packages, {} more from tests",
            deps.len(),
            test_deps.len()
        );

        if !deep {
            return Ok((deps, test_deps));
        }

        let deps = self.resolve_imports(config, deps.into(), false).await?;
        let test_deps = if test_deps.is_empty() {
            Vec::new()
        } else {
            self.resolve_imports(config, test_deps.into(), true).await?
        };
        Ok((deps, test_deps))
    }

    /// Keep the imports that name third-party packages.
    fn external(&mut self, config: &Config, imports: BTreeSet<String>) -> Vec<String> {
        imports
            .into_iter()
            .filter(|imp| !config.has_ignore(imp))
            .filter(|imp| {
                matches!(
                    self.find_pkg(config, imp).loc,
                    PkgLoc::Unknown | PkgLoc::Vendor | PkgLoc::Gopath
                )
            })
            .collect()
    }

    /// Resolve everything reachable from `deps` and their subpackages.
    pub async fn resolve_all(&mut self, config: &mut Config, deps: &[Dependency], add_test: bool) -> Result<Vec<String>> {
        let mut queue = VecDeque::new();
        for dep in deps {
            queue.push_back(dep.name.clone());
            for sub in &dep.subpackages {
                queue.push_back(format!("{}/{}", dep.name, sub));
            }
        }
        self.resolve_imports(config, queue, add_test).await
    }

    async fn resolve_imports(&mut self, config: &mut Config, mut queue: VecDeque<String>, add_test: bool) -> Result<Vec<String>> {
        let mut reached = BTreeSet::new();

        while let Some(dep) = queue.pop_front() {
            if self.already_q.contains(&dep) {
                if self.scanned.contains(&dep) {
                    reached.insert(dep);
                }
                continue;
            }
            self.already_q.insert(dep.clone());
            if config.has_ignore(&dep) {
                continue;
            }

            let path = self.handler.pkg_path(config, &dep);
            debug!("Trying to open {} ({})", dep, path.display());
            if !path.is_dir() {
                self.handle_missing(config, &mut queue, dep, add_test).await;
                continue;
            }

            if let Err(e) = self.version_handler.process(config, &dep).await {
                warn!("Failed to process {}: {:#}", dep, e);
            }

            let imports = self.scan_package(&path).await?;
            self.scanned.insert(dep.clone());
            reached.insert(dep.clone());
            let Some(imports) = imports else {
                debug!("No buildable source in {}, skipping", path.display());
                continue;
            };

            for imp in imports {
                if config.has_ignore(&imp) || self.already_q.contains(&imp) || queue.contains(&imp) {
                    continue;
                }
                let info = self.find_pkg(config, &imp);
                let accepted = match info.loc {
                    PkgLoc::Vendor => {
                        debug!("In vendor: {}", imp);
                        self.handler.in_vendor(config, &imp, add_test).await
                    }
                    PkgLoc::Unknown => {
                        debug!("Missing {}. Trying to resolve.", imp);
                        self.fetched.insert(imp.clone());
                        self.handler.not_found(config, &imp, add_test).await
                    }
                    PkgLoc::Gopath => {
                        debug!("Found on GOPATH, not vendor: {}", imp);
                        self.handler.on_gopath(config, &imp, add_test).await
                    }
                    _ => continue,
                };
                match accepted {
                    Ok(true) => {
                        debug!("Package {} imports {}", dep, imp);
                        if let Err(e) = self.version_handler.set_version(config, &imp, add_test).await {
                            warn!("Failed to set version on {}: {:#}", imp, e);
                        }
                        queue.push_back(imp);
                    }
                    Ok(false) if info.loc == PkgLoc::Unknown => warn!("Not found: {}", imp),
                    Ok(false) => {}
                    Err(e) => warn!("Error looking for {}: {:#}", imp, e),
                }
            }
        }

        let reached: Vec<String> = reached.into_iter().collect();
        self.merge_packages(config, &reached, add_test).await;
        Ok(reached)
    }

    /// A queued package has no source directory. Ask the handler once, and
    /// requeue it at the front when the handler made it available.
    async fn handle_missing(&mut self, config: &mut Config, queue: &mut VecDeque<String>, dep: String, add_test: bool) {
        if !self.fetched.insert(dep.clone()) {
            warn!("Not found: {}", dep);
            return;
        }
        match self.handler.not_found(config, &dep, add_test).await {
            Ok(true) => {
                self.already_q.remove(&dep);
                queue.push_front(dep);
            }
            Ok(false) => warn!("Not found: {}", dep),
            Err(e) => warn!("Error looking for {}: {:#}", dep, e),
        }
    }

    async fn scan_package(&self, path: &Path) -> Result<Option<BTreeSet<String>>> {
        let path = path.to_path_buf();
        let all_files = self.resolve_all_files;
        tokio::task::spawn_blocking(move || -> Result<Option<BTreeSet<String>>> {
            if !all_files {
                return Ok(scan_dir(&path)?.map(|scan| scan.imports));
            }
            let scans = scan_tree(&path, &[])?;
            if scans.is_empty() {
                return Ok(None);
            }
            Ok(Some(scans.into_iter().flat_map(|scan| scan.imports).collect()))
        })
        .await
        .context("Package scan task failed")?
    }

    /// Record `packages` in the manifest as `(root, subpackage)` pairs.
    /// Test-only packages go to dev imports unless the root is already a
    /// regular import.
    pub async fn merge_packages(&self, config: &mut Config, packages: &[String], add_test: bool) {
        for pkg in packages {
            if !config.name.is_empty() && is_under(pkg, &config.name) {
                continue;
            }
            let (root, sub) = normalize_name(self.discovery, config, pkg).await;
            if config.has_ignore(&root) {
                continue;
            }

            let list = if add_test && !config.imports.has(&root) {
                &mut config.dev_imports
            } else {
                &mut config.imports
            };
            match list.get_dep_mut(&root) {
                Some(existing) => existing.add_subpackage(&sub),
                None => {
                    debug!("Adding {} to the manifest", root);
                    let mut dep = Dependency::new(&root);
                    dep.add_subpackage(&sub);
                    list.push(dep);
                }
            }
        }
    }
}

/// Split an import path into its repository root and the subpackage below it.
///
/// Roots already declared in `config` win; otherwise the root is discovered.
pub async fn normalize_name(discovery: &ImportDiscovery, config: &Config, name: &str) -> (String, String) {
    let name = name.replace('\\', "/");
    let declared = config
        .imports
        .iter()
        .chain(config.dev_imports.iter())
        .map(|dep| dep.name.as_str())
        .filter(|root| is_under(&name, root))
        .max_by_key(|root| root.len());

    let root = match declared {
        Some(root) => root.to_string(),
        None => discovery.root_of(&name).await,
    };
    let sub = name
        .strip_prefix(root.as_str())
        .map(|rest| rest.trim_start_matches('/').to_string())
        .unwrap_or_default();
    (root, sub)
}

/// Whether `name` is `prefix` or lies below it.
fn is_under(name: &str, prefix: &str) -> bool {
    name == prefix || name.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// Scan every package directory below `root`.
fn scan_tree(root: &Path, exclude: &[String]) -> Result<Vec<PackageScan>> {
    let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if name == "vendor" || name == "testdata" || name.starts_with('_') || name.starts_with('.') {
            return false;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        !exclude.iter().any(|dir| dir.trim_end_matches('/') == rel)
    });

    let mut scans = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if let Some(scan) = scan_dir(entry.path())? {
            scans.push(scan);
        }
    }
    Ok(scans)
}

#[cfg(test)]
mod tests;
