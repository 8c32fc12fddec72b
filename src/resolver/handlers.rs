//! Hooks the resolver calls when it meets packages it cannot place by itself.

use anyhow::Result;
use std::path::PathBuf;
use tracing::debug;

use crate::manifest::Config;

/// Decides what happens to packages the resolver could not find in the
/// project's vendor directory.
///
/// Each hook returns whether the package should be (re)queued for scanning.
#[allow(async_fn_in_trait)]
pub trait MissingPackageHandler {
    /// `pkg` was found nowhere.
    async fn not_found(&mut self, config: &mut Config, pkg: &str, add_test: bool) -> Result<bool>;

    /// `pkg` exists on `GOPATH` but not in vendor.
    async fn on_gopath(&mut self, config: &mut Config, pkg: &str, add_test: bool) -> Result<bool>;

    /// `pkg` exists in vendor.
    async fn in_vendor(&mut self, config: &mut Config, pkg: &str, add_test: bool) -> Result<bool>;

    /// Directory whose source is scanned for `pkg`.
    fn pkg_path(&self, config: &Config, pkg: &str) -> PathBuf;
}

/// Sees every package the resolver discovers, so versions can be chosen
/// while the graph is still being walked.
#[allow(async_fn_in_trait)]
pub trait VersionHandler {
    /// Called once for each package taken off the queue.
    async fn process(&mut self, config: &mut Config, pkg: &str) -> Result<()>;

    /// Called when an import of `pkg` is accepted into the graph.
    async fn set_version(&mut self, config: &mut Config, pkg: &str, add_test: bool) -> Result<()>;
}

/// Records what is missing and never fetches anything.
#[derive(Debug, Clone)]
pub struct DefaultMissingPackageHandler {
    vendor_dir: PathBuf,
    pub missing: Vec<String>,
    pub gopath: Vec<String>,
}

impl DefaultMissingPackageHandler {
    pub fn new(vendor_dir: impl Into<PathBuf>) -> Self {
        Self {
            vendor_dir: vendor_dir.into(),
            missing: Vec::new(),
            gopath: Vec::new(),
        }
    }
}

impl MissingPackageHandler for DefaultMissingPackageHandler {
    async fn not_found(&mut self, _config: &mut Config, pkg: &str, _add_test: bool) -> Result<bool> {
        self.missing.push(pkg.to_string());
        Ok(false)
    }

    async fn on_gopath(&mut self, _config: &mut Config, pkg: &str, _add_test: bool) -> Result<bool> {
        self.gopath.push(pkg.to_string());
        Ok(false)
    }

    async fn in_vendor(&mut self, _config: &mut Config, _pkg: &str, _add_test: bool) -> Result<bool> {
        Ok(true)
    }

    fn pkg_path(&self, _config: &Config, pkg: &str) -> PathBuf {
        self.vendor_dir.join(pkg)
    }
}

/// Leaves versions alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultVersionHandler;

impl VersionHandler for DefaultVersionHandler {
    async fn process(&mut self, _config: &mut Config, _pkg: &str) -> Result<()> {
        Ok(())
    }

    async fn set_version(&mut self, _config: &mut Config, pkg: &str, _add_test: bool) -> Result<()> {
        debug!("No version handling for {}", pkg);
        Ok(())
    }
}
