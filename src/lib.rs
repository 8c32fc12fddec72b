//! grove - a vendoring dependency manager for Go projects.
//!
//! grove reads a project's `grove.yaml`, scans its Go sources for imports,
//! fetches every third-party repository into a shared cache, pins each one to
//! a concrete revision and copies the pinned trees into `vendor/`. The pins
//! are recorded in `grove.lock` so that `grove install` reproduces them.
//!
//! # Architecture Overview
//!
//! - [`resolver`] walks the import graph and classifies every package
//!   (vendor, `GOPATH`, `GOROOT`, unknown)
//! - [`vcs`] drives git, hg, svn and bzr working copies
//! - [`version`] turns references and semver constraints into revisions
//! - [`cache`] owns `<home>/cache`, with per-repository advisory locks
//! - [`installer`] fetches, updates and pins through a worker pool, then
//!   exports into `vendor/`
//! - [`manifest`] and [`lockfile`] are the `grove.yaml`/`grove.lock` data model
//! - [`importer`] reads dependencies' own manifests, including Godep and GPM
//!
//! # Manifest Format (grove.yaml)
//!
//! ```yaml
//! package: github.com/acme/widget
//! import:
//!   - package: github.com/pkg/errors
//!     version: ^0.8.0
//! devimport:
//!   - package: github.com/stretchr/testify
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! grove update      # resolve, fetch, pin, write grove.lock, export
//! grove install     # reproduce grove.lock into vendor/
//! grove list        # show what the project imports
//! grove cache-clear # empty the shared cache
//! ```

// Core functionality modules
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod resolver;

// VCS integration
pub mod vcs;

// Data model
pub mod importer;
pub mod lockfile;
pub mod manifest;

// Supporting modules
pub mod installer;
pub mod utils;
pub mod version;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
