//! Fetching, updating and pinning dependencies in the shared cache.
//!
//! The installer drives one repository per dependency through the cache:
//!
//! 1. fetch it when the cache has no working copy, otherwise update it;
//! 2. pin it: check out the revision its reference selects;
//! 3. export the pinned working copies into the project's `vendor/`.
//!
//! # Concurrency
//!
//! Steps 1 and 2 run in a fixed-width worker pool (`buffer_unordered`) whose
//! width comes from [`GroveContext::concurrency`]. Every touch of a cache
//! entry happens under that entry's [`CacheLock`](crate::cache::CacheLock),
//! so two workers, or two grove processes, never operate on one working copy
//! at the same time.
//!
//! An [`UpdateTracker`] records which dependencies were already handled in
//! the current call. A dependency that already carries a pin is treated as
//! resolved and skipped; repeated passes over the same manifest are cheap.
//!
//! # Failures
//!
//! A failing dependency never stops its siblings. Pool operations return the
//! failures as `(name, error)` pairs and leave the dependency unresolved.

mod export;
pub mod handlers;
pub mod project;

pub use handlers::{ImportCache, InstallerMissingHandler, InstallerVersionHandler};

use anyhow::Result;
use dashmap::DashSet;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};

use crate::cache::{Cache, RepoData, cache_key};
use crate::constants::{FETCH_RETRY_ATTEMPTS, MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use crate::core::{GroveContext, GroveError, OperationContext};
use crate::lockfile::Lockfile;
use crate::manifest::{Config, Dependency};
use crate::resolver::Resolver;
use crate::utils::{ProgressBar, host_goarch, host_goos};
use crate::vcs::{VcsProvider, VcsRepo};
use crate::version;

/// Per-dependency failures of a pool operation.
pub type Failures = Vec<(String, anyhow::Error)>;

/// Names of the dependencies already handled in one install or update call.
#[derive(Debug, Default)]
pub struct UpdateTracker {
    seen: DashSet<String>,
}

impl UpdateTracker {
    /// Mark `name` as handled. Returns `false` when it already was.
    pub fn add(&self, name: &str) -> bool {
        self.seen.insert(name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Result of [`Installer::install`].
#[derive(Debug)]
pub struct Installed {
    /// The manifest rebuilt from the lock, with pins set.
    pub config: Config,
    pub failures: Failures,
}

/// Result of [`Installer::update`].
#[derive(Debug)]
pub struct Updated {
    /// The manifest after resolution, with every reached dependency pinned.
    pub config: Config,
    pub lock: Lockfile,
    pub failures: Failures,
}

/// Drives a [`VcsProvider`] against the cache.
pub struct Installer<P> {
    ctx: GroveContext,
    cache: Cache,
    vcs: P,
    ops: OperationContext,
    retry_base: Duration,
}

impl<P: VcsProvider> Installer<P> {
    pub fn new(ctx: GroveContext, vcs: P) -> Self {
        Self {
            cache: Cache::new(&ctx),
            ctx,
            vcs,
            ops: OperationContext::new(),
            retry_base: Duration::from_millis(STARTING_BACKOFF_DELAY_MS),
        }
    }

    /// Override the first delay between fetch attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base = delay;
        self
    }

    pub const fn context(&self) -> &GroveContext {
        &self.ctx
    }

    pub const fn cache(&self) -> &Cache {
        &self.cache
    }

    pub const fn vcs(&self) -> &P {
        &self.vcs
    }

    pub const fn operations(&self) -> &OperationContext {
        &self.ops
    }

    /// Make the cached working copies match `lock`.
    ///
    /// Only repositories that do not already contain their locked revision
    /// are fetched. The returned manifest carries the lock's versions as
    /// references and pins.
    pub async fn install(&self, lock: &Lockfile, conf: &Config) -> Result<Installed> {
        let (imports, dev_imports) = lock.to_dependencies();
        let mut config = Config {
            name: conf.name.clone(),
            ignore: conf.ignore.clone(),
            exclude_dirs: conf.exclude_dirs.clone(),
            imports,
            dev_imports: if self.ctx.resolve_test() { dev_imports } else { Vec::new() },
        };
        config.dedupe()?;

        if config.imports.is_empty() && config.dev_imports.is_empty() {
            info!("No dependencies found. Nothing installed.");
            return Ok(Installed {
                config,
                failures: Vec::new(),
            });
        }

        self.cache.setup().await?;
        info!("Downloading dependencies. Please wait...");
        let tracker = UpdateTracker::default();
        let mut failures = self.lazy_update(&config.imports, &tracker).await;
        failures.extend(self.lazy_update(&config.dev_imports, &tracker).await);
        failures.extend(self.set_references(&mut config).await);

        Ok(Installed { config, failures })
    }

    /// Resolve the project's imports, fetch or update every dependency and
    /// pin it, producing a fresh lock for `conf`.
    ///
    /// `conf` is not modified; the resolved manifest is returned.
    pub async fn update(&self, conf: &Config) -> Result<Updated> {
        let hash = conf.hash()?;
        let mut config = conf.clone();
        self.cache.setup().await?;

        let tracker = UpdateTracker::default();
        let import_cache = ImportCache::default();
        let mut resolver = Resolver::new(
            &self.ctx,
            self.vcs.discovery(),
            InstallerMissingHandler::new(self, &tracker, &import_cache),
            InstallerVersionHandler::new(self, &import_cache),
        );

        info!("Resolving imports");
        let (imports, test_imports) = resolver.resolve_local(&mut config, false).await?;
        resolver.merge_packages(&mut config, &imports, false).await;
        resolver.merge_packages(&mut config, &test_imports, true).await;

        info!("Downloading dependencies. Please wait...");
        let mut failures = self.concurrent_update(&config.imports, &tracker).await;
        if self.ctx.resolve_test() {
            failures.extend(self.concurrent_update(&config.dev_imports, &tracker).await);
        }

        let roots = config.imports.clone();
        resolver.resolve_all(&mut config, &roots, false).await?;
        if self.ctx.resolve_test() {
            let dev_roots = config.dev_imports.clone();
            resolver.resolve_all(&mut config, &dev_roots, true).await?;
        }
        drop(resolver);

        failures.extend(self.set_references(&mut config).await);

        let dev_imports = if self.ctx.resolve_test() {
            config.dev_imports.as_slice()
        } else {
            &[]
        };
        let lock = Lockfile::new(&config.imports, dev_imports, hash)?;
        Ok(Updated {
            config,
            lock,
            failures,
        })
    }

    /// Fetch or update every dependency in `deps` through the worker pool.
    pub async fn concurrent_update(&self, deps: &[Dependency], tracker: &UpdateTracker) -> Failures {
        self.run_pool(deps, "Updating", move |dep| self.vcs_update(dep, tracker)).await
    }

    /// Like [`concurrent_update`](Self::concurrent_update), but skip
    /// dependencies whose working copy already has the wanted revision.
    pub async fn lazy_update(&self, deps: &[Dependency], tracker: &UpdateTracker) -> Failures {
        self.run_pool(deps, "Installing", move |dep| async move {
            if self.has_revision(dep).await {
                debug!("{} already has {} in the cache", dep.name, dep.reference);
                tracker.add(&dep.name);
                return Ok(());
            }
            self.vcs_update(dep, tracker).await
        })
        .await
    }

    async fn run_pool<'d, F, Fut>(&self, deps: &'d [Dependency], prefix: &str, work: F) -> Failures
    where
        F: Fn(&'d Dependency) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if deps.is_empty() {
            return Vec::new();
        }
        let progress = ProgressBar::new(deps.len() as u64, prefix, self.ctx.quiet());
        let results: Vec<Result<(), (String, anyhow::Error)>> = stream::iter(deps)
            .map(|dep| {
                let fut = work(dep);
                let progress = &progress;
                async move {
                    progress.set_message(dep.name.clone());
                    let result = fut.await.map_err(|e| (dep.name.clone(), e));
                    progress.inc(1);
                    result
                }
            })
            .buffer_unordered(self.ctx.concurrency())
            .collect()
            .await;
        progress.finish_and_clear();

        let failures: Failures = results.into_iter().filter_map(Result::err).collect();
        for (name, error) in &failures {
            warn!("Update failed for {}: {:#}", name, error);
        }
        failures
    }

    /// Whether the cached working copy of `dep` already knows its reference.
    async fn has_revision(&self, dep: &Dependency) -> bool {
        if dep.reference.is_empty() {
            return false;
        }
        let Ok(key) = cache_key(&dep.remote()) else {
            return false;
        };
        let dest = self.cache.src_path(&key);
        if !dest.exists() {
            return false;
        }
        let Ok(_lock) = self.cache.lock(&key).await else {
            return false;
        };
        match self.vcs.open(dep, &dest).await {
            Ok(repo) => repo.is_reference(&dep.reference).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Fetch `dep` into the cache, or update the existing working copy.
    pub async fn vcs_update(&self, dep: &Dependency, tracker: &UpdateTracker) -> Result<()> {
        if !dep.pin.is_empty() {
            debug!("{} is pinned to {}, skipping update", dep.name, dep.pin);
            return Ok(());
        }
        if !tracker.add(&dep.name) {
            debug!("{} was already updated in this run", dep.name);
            return Ok(());
        }
        let (goos, goarch) = (host_goos(), host_goarch());
        if !dep.matches_platform(goos, goarch) {
            info!("{} is not used for {}/{}", dep.name, goos, goarch);
            return Ok(());
        }

        let remote = dep.remote();
        let key = cache_key(&remote)?;
        let _lock = self.cache.lock(&key).await?;
        let dest = self.cache.src_path(&key);

        let repo = if dest.exists() {
            self.refresh(dep, &key, &dest).await?
        } else {
            self.fetch(dep, &key, &dest).await?
        };

        if dep.reference.is_empty()
            && let Some(branch) = self
                .cache
                .default_branch(&key, repo.kind(), &remote, self.vcs.discovery())
                .await?
            && repo.current_branch().await?.as_deref() != Some(branch.as_str())
        {
            debug!("Checking out default branch {} of {}", branch, dep.name);
            repo.update_version(&branch).await?;
        }
        Ok(())
    }

    /// First fetch of `dep`. Records the branch the clone landed on as the
    /// repository's default branch.
    async fn fetch(&self, dep: &Dependency, key: &str, dest: &Path) -> Result<P::Repo> {
        info!("--> Fetching {}", dep.name);
        let repo = self.vcs.open(dep, dest).await?;
        self.get_with_retry(&repo).await?;

        if let Some(branch) = repo.current_branch().await? {
            let data = RepoData {
                default_branch: branch,
                ..RepoData::default()
            };
            self.cache.save_repo_data(key, &data).await?;
        }
        Ok(repo)
    }

    /// Update an existing working copy of `dep`.
    async fn refresh(&self, dep: &Dependency, key: &str, dest: &Path) -> Result<P::Repo> {
        let repo = match self.vcs.open(dep, dest).await {
            Ok(repo) => repo,
            Err(e) => {
                let replaceable = e.downcast_ref::<GroveError>().is_some_and(GroveError::is_replaceable_mismatch);
                if !replaceable || !self.ctx.force() {
                    return Err(e);
                }
                warn!("Replacing {} in the cache: {}", dep.name, e);
                tokio::fs::remove_dir_all(dest).await?;
                return self.fetch(dep, key, dest).await;
            }
        };

        if repo.is_dirty().await? {
            return Err(GroveError::DirtyCheckout { name: dep.name.clone() }.into());
        }

        let current = repo.version().await?;
        if !dep.reference.is_empty() && current == dep.reference {
            info!("--> Found desired version locally {} {}", dep.name, dep.reference);
            return Ok(repo);
        }

        info!("--> Fetching updates for {}", dep.name);
        repo.update().await?;
        Ok(repo)
    }

    /// `get`, retried with exponential backoff. A partial checkout left by a
    /// failed attempt is removed before the next one.
    async fn get_with_retry(&self, repo: &P::Repo) -> Result<()> {
        let base = self.retry_base.as_millis().max(1) as u64;
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(base / 2)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
            .take(FETCH_RETRY_ATTEMPTS.saturating_sub(1));

        RetryIf::start(
            strategy,
            move || async move {
                let local = repo.local_path();
                if local.exists() {
                    tokio::fs::remove_dir_all(local).await?;
                }
                repo.get().await
            },
            |e: &anyhow::Error| {
                debug!("Fetch of {} failed, retrying: {:#}", repo.remote(), e);
                true
            },
        )
        .await
    }

    /// Pin every dependency of `config` through the worker pool.
    pub async fn set_references(&self, config: &mut Config) -> Failures {
        let dev: &mut [Dependency] = if self.ctx.resolve_test() {
            &mut config.dev_imports
        } else {
            &mut []
        };
        let deps = config.imports.iter_mut().chain(dev.iter_mut());
        let results: Vec<Result<(), (String, anyhow::Error)>> = stream::iter(deps)
            .map(|dep| async move {
                let name = dep.name.clone();
                self.pin_dependency(dep).await.map_err(|e| (name, e))
            })
            .buffer_unordered(self.ctx.concurrency())
            .collect()
            .await;

        let failures: Failures = results.into_iter().filter_map(Result::err).collect();
        for (name, error) in &failures {
            warn!("Failed to set version on {}: {:#}", name, error);
        }
        failures
    }

    /// Check out the revision `dep` asks for in its cached working copy.
    pub async fn pin_dependency(&self, dep: &mut Dependency) -> Result<()> {
        if !dep.pin.is_empty() || !dep.matches_platform(host_goos(), host_goarch()) {
            return Ok(());
        }
        let key = cache_key(&dep.remote())?;
        let _lock = self.cache.lock(&key).await?;
        let dest = self.cache.src_path(&key);
        if !dest.exists() {
            anyhow::bail!("{} is not in the cache at {}", dep.name, dest.display());
        }
        let repo = self.vcs.open(dep, &dest).await?;
        version::pin(&repo, dep).await
    }

    /// Copy every pinned working copy into `vendor/`.
    pub async fn export(&self, config: &Config) -> Result<Failures> {
        export::export(self, config).await
    }
}
