//! Project-level workflows behind the `install`, `update` and `list`
//! commands: load `grove.yaml`, run the installer, write `grove.lock`, and
//! export into `vendor/`.

use anyhow::Result;
use tracing::{info, warn};

use super::{Failures, Installer};
use crate::constants::{LOCK_FILE, MANIFEST_FILE};
use crate::core::GroveContext;
use crate::lockfile::Lockfile;
use crate::manifest::Config;
use crate::resolver::{DefaultMissingPackageHandler, DefaultVersionHandler, Resolver};
use crate::vcs::VcsProvider;

/// What a project workflow did.
#[derive(Debug, Default)]
pub struct Outcome {
    /// The lock that `vendor/` now reflects.
    pub lock: Option<Lockfile>,
    /// Whether `grove.lock` was (re)written.
    pub lock_written: bool,
    /// Per-dependency failures from every stage.
    pub failures: Failures,
}

fn load_manifest(ctx: &GroveContext) -> Result<Config> {
    Config::load(&ctx.project_dir().join(MANIFEST_FILE))
}

/// Install from `grove.lock` when it matches the manifest, otherwise fall
/// back to [`update`]. Exports into `vendor/` either way.
pub async fn install<P: VcsProvider>(installer: &Installer<P>) -> Result<Outcome> {
    let ctx = installer.context();
    let conf = load_manifest(ctx)?;
    let lock_path = ctx.project_dir().join(LOCK_FILE);

    let lock = match Lockfile::load(&lock_path)? {
        Some(lock) if lock.is_current(&conf.hash()?) => lock,
        Some(_) => {
            warn!("Lock file may be out of date. Hash check of grove.yaml failed. Running update.");
            return update(installer).await;
        }
        None => {
            info!("Lock file ({}) does not exist. Performing update.", LOCK_FILE);
            return update(installer).await;
        }
    };

    let installed = installer.install(&lock, &conf).await?;
    let mut failures = installed.failures;
    failures.extend(installer.export(&installed.config).await?);
    log_failures(&failures);

    Ok(Outcome {
        lock: Some(lock),
        lock_written: false,
        failures,
    })
}

/// Resolve, fetch and pin every dependency, then write `grove.lock` when the
/// pinned versions changed and export into `vendor/`.
pub async fn update<P: VcsProvider>(installer: &Installer<P>) -> Result<Outcome> {
    let ctx = installer.context();
    let conf = load_manifest(ctx)?;
    let lock_path = ctx.project_dir().join(LOCK_FILE);

    let updated = installer.update(&conf).await?;
    let mut failures = updated.failures;

    let unchanged = match Lockfile::load(&lock_path) {
        Ok(Some(existing)) => existing.fingerprint()? == updated.lock.fingerprint()?,
        Ok(None) => false,
        Err(e) => {
            warn!("Replacing unreadable {}: {:#}", LOCK_FILE, e);
            false
        }
    };
    if unchanged {
        info!("Versions did not change. Skipping {} update.", LOCK_FILE);
    } else {
        info!("Writing {}", LOCK_FILE);
        updated.lock.save(&lock_path)?;
    }

    failures.extend(installer.export(&updated.config).await?);
    log_failures(&failures);

    Ok(Outcome {
        lock: Some(updated.lock),
        lock_written: !unchanged,
        failures,
    })
}

/// Packages a project imports, as found on disk without fetching anything.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Listing {
    /// Root import paths resolved from `vendor/`.
    pub installed: Vec<String>,
    /// Imports found on `GOPATH` instead of `vendor/`.
    pub gopath: Vec<String>,
    /// Imports found nowhere.
    pub missing: Vec<String>,
}

/// Walk the project's import graph through `vendor/` and report what was
/// reached.
pub async fn list<P: VcsProvider>(ctx: &GroveContext, vcs: &P) -> Result<Listing> {
    let mut config = load_manifest(ctx)?;
    let mut resolver = Resolver::new(
        ctx,
        vcs.discovery(),
        DefaultMissingPackageHandler::new(ctx.vendor_dir()),
        DefaultVersionHandler,
    );
    let (imports, test_imports) = resolver.resolve_local(&mut config, true).await?;
    resolver.merge_packages(&mut config, &imports, false).await;
    resolver.merge_packages(&mut config, &test_imports, true).await;
    let (handler, _) = resolver.into_handlers();

    let mut missing = handler.missing;
    missing.sort();
    missing.dedup();
    let mut gopath = handler.gopath;
    gopath.sort();
    gopath.dedup();

    let mut installed: Vec<String> = config
        .imports
        .iter()
        .chain(config.dev_imports.iter())
        .map(|dep| dep.name.clone())
        .filter(|name| ctx.vendor_dir().join(name).is_dir())
        .collect();
    installed.sort();
    installed.dedup();

    Ok(Listing {
        installed,
        gopath,
        missing,
    })
}

fn log_failures(failures: &Failures) {
    if failures.is_empty() {
        return;
    }
    warn!("{} dependencies could not be fully installed:", failures.len());
    for (name, _) in failures {
        warn!("  {}", name);
    }
}
