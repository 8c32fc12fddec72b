//! Test utilities for grove
//!
//! - [`init_test_logging`] routes `tracing` output to the test harness
//! - [`FakeVcs`] is a scripted VCS provider that counts operations per remote
//! - [`TestGit`] builds real git repositories for backend tests
//! - [`TestHg`] does the same for Mercurial

pub mod fake_vcs;
pub mod git_helper;
pub mod hg_helper;

pub use fake_vcs::{FakeRemote, FakeRepo, FakeVcs};
pub use git_helper::TestGit;
pub use hg_helper::TestHg;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `None` the filter comes from
/// `RUST_LOG`; when that is unset too, nothing is logged.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true) // Show module targets like "vcs"
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// A minimal Go source file in package `name` importing `imports`.
pub fn go_source(name: &str, imports: &[&str]) -> String {
    let mut src = format!("package {name}\n\n");
    if !imports.is_empty() {
        src.push_str("import (\n");
        for imp in imports {
            src.push_str(&format!("\t\"{imp}\"\n"));
        }
        src.push_str(")\n");
    }
    src.push_str("\nfunc Noop() {}\n");
    src
}
