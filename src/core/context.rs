//! Run configuration shared by the resolver, installer and cache.
//!
//! A [`GroveContext`] replaces process-wide flags: every component that needs
//! to know where the cache lives, whether `--force` was passed, or how many
//! workers to run receives a reference to one of these.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{CONCURRENT_WORKERS, DEFAULT_COMMAND_TIMEOUT, VENDOR_DIR};

/// Settings for one grove invocation.
#[derive(Debug, Clone)]
pub struct GroveContext {
    home: PathBuf,
    project_dir: PathBuf,
    vendor_dir: PathBuf,
    force: bool,
    resolve_test: bool,
    resolve_all_files: bool,
    strip_vendor: bool,
    concurrency: usize,
    command_timeout: Duration,
    quiet: bool,
    debug: bool,
}

impl Default for GroveContext {
    fn default() -> Self {
        let home = crate::config::grove_home()
            .unwrap_or_else(|_| PathBuf::from(crate::constants::HOME_DIR_NAME));
        Self::new(home, PathBuf::from("."))
    }
}

impl GroveContext {
    /// Context rooted at `project_dir` with its cache under `home`.
    pub fn new(home: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        Self {
            home: home.into(),
            vendor_dir: project_dir.join(VENDOR_DIR),
            project_dir,
            force: false,
            resolve_test: true,
            resolve_all_files: false,
            strip_vendor: false,
            concurrency: CONCURRENT_WORKERS,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            quiet: false,
            debug: false,
        }
    }

    /// Override the vendor directory (defaults to `<project>/vendor`).
    #[must_use]
    pub fn with_vendor_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.vendor_dir = dir.into();
        self
    }

    /// Allow destructive replacement of mismatched cache entries.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Resolve and install dev (test) imports as well.
    #[must_use]
    pub const fn with_resolve_test(mut self, resolve_test: bool) -> Self {
        self.resolve_test = resolve_test;
        self
    }

    /// Walk every directory of every dependency instead of only imported packages.
    #[must_use]
    pub const fn with_resolve_all_files(mut self, all: bool) -> Self {
        self.resolve_all_files = all;
        self
    }

    /// Leave nested `vendor/` and `Godeps/_workspace/` directories out of exports.
    #[must_use]
    pub const fn with_strip_vendor(mut self, strip: bool) -> Self {
        self.strip_vendor = strip;
        self
    }

    /// Worker pool width. Zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    /// Per-command timeout for VCS clients.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Output verbosity flags.
    #[must_use]
    pub const fn with_verbosity(mut self, quiet: bool, debug: bool) -> Self {
        self.quiet = quiet;
        self.debug = debug;
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Cache root, `<home>/cache`.
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn vendor_dir(&self) -> &Path {
        &self.vendor_dir
    }

    pub const fn force(&self) -> bool {
        self.force
    }

    pub const fn resolve_test(&self) -> bool {
        self.resolve_test
    }

    pub const fn resolve_all_files(&self) -> bool {
        self.resolve_all_files
    }

    pub const fn strip_vendor(&self) -> bool {
        self.strip_vendor
    }

    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub const fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub const fn quiet(&self) -> bool {
        self.quiet
    }

    pub const fn debug(&self) -> bool {
        self.debug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_follows_project_dir() {
        let ctx = GroveContext::new("/h", "/work/proj");
        assert_eq!(ctx.vendor_dir(), Path::new("/work/proj/vendor"));
        assert_eq!(ctx.cache_dir(), PathBuf::from("/h/cache"));
    }

    #[test]
    fn test_builder_flags() {
        let ctx = GroveContext::new("/h", "/p")
            .with_force(true)
            .with_resolve_test(false)
            .with_concurrency(0)
            .with_strip_vendor(true)
            .with_vendor_dir("/elsewhere");
        assert!(ctx.force());
        assert!(ctx.strip_vendor());
        assert!(!ctx.resolve_test());
        assert_eq!(ctx.concurrency(), 1);
        assert_eq!(ctx.vendor_dir(), Path::new("/elsewhere"));
    }

    #[test]
    fn test_defaults() {
        let ctx = GroveContext::new("/h", "/p");
        assert_eq!(ctx.concurrency(), CONCURRENT_WORKERS);
        assert_eq!(ctx.command_timeout(), DEFAULT_COMMAND_TIMEOUT);
        assert!(!ctx.force());
        assert!(ctx.resolve_test());
        assert!(!ctx.strip_vendor());
    }
}
