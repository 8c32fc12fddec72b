//! Copying pinned working copies from the cache into `vendor/`.
//!
//! The new tree is assembled in a temporary directory next to the project
//! and swapped in only once every copy is done, so an interrupted export
//! leaves the previous `vendor/` untouched. With `--strip-vendor` the
//! dependencies' own `vendor/` directories are not copied.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{Failures, Installer};
use crate::cache::cache_key;
use crate::manifest::{Config, Dependency, DependencyList};
use crate::utils::{copy_dir_without_vcs, host_goarch, host_goos, move_dir};
use crate::vcs::VcsProvider;

pub(super) async fn export<P: VcsProvider>(installer: &Installer<P>, config: &Config) -> Result<Failures> {
    let ctx = installer.context();
    let project = ctx.project_dir().to_path_buf();
    let vendor = ctx.vendor_dir().to_path_buf();

    let tmp = tempfile::Builder::new()
        .prefix(".grove-vendor")
        .tempdir_in(&project)
        .with_context(|| format!("Failed to create a temporary directory in {}", project.display()))?;
    let staged = tmp.path().join("vendor");
    tokio::fs::create_dir_all(&staged).await?;

    info!("Exporting resolved dependencies...");
    let (goos, goarch) = (host_goos(), host_goarch());
    let dev: &[Dependency] = if ctx.resolve_test() { &config.dev_imports } else { &[] };
    let deps: Vec<&Dependency> = config
        .imports
        .iter()
        .chain(dev.iter().filter(|dep| !config.imports.has(&dep.name)))
        .filter(|dep| dep.matches_platform(goos, goarch))
        .collect();

    let staged_ref = staged.as_path();
    let results: Vec<Result<(), (String, anyhow::Error)>> = stream::iter(deps)
        .map(|dep| async move {
            export_one(installer, dep, staged_ref)
                .await
                .map_err(|e| (dep.name.clone(), e))
        })
        .buffer_unordered(ctx.concurrency())
        .collect()
        .await;
    let failures: Failures = results.into_iter().filter_map(Result::err).collect();
    for (name, error) in &failures {
        warn!("Failed to export {}: {:#}", name, error);
    }

    let vendor_git = vendor.join(".git");
    if vendor_git.exists() {
        debug!("Preserving {}", vendor_git.display());
        move_blocking(vendor_git, staged.join(".git")).await?;
    }
    if vendor.exists() {
        tokio::fs::remove_dir_all(&vendor)
            .await
            .with_context(|| format!("Failed to remove {}", vendor.display()))?;
    }
    if let Some(parent) = vendor.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    move_blocking(staged, vendor).await?;

    Ok(failures)
}

async fn export_one<P: VcsProvider>(installer: &Installer<P>, dep: &Dependency, staged: &Path) -> Result<()> {
    let key = cache_key(&dep.remote())?;
    let _lock = installer.cache().lock(&key).await?;
    let from = installer.cache().src_path(&key);
    if !from.exists() {
        anyhow::bail!("{} is not in the cache at {}", dep.name, from.display());
    }
    let to = staged.join(&dep.name);
    let strip_vendor = installer.context().strip_vendor();
    debug!("--> Exporting {}", dep.name);
    tokio::task::spawn_blocking(move || copy_dir_without_vcs(&from, &to, strip_vendor)).await?
}

async fn move_blocking(from: PathBuf, to: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || move_dir(&from, &to)).await?
}
