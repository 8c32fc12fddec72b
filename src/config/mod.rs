//! Locating grove's directories and loading user-wide settings.
//!
//! Two locations matter:
//!
//! - the grove home (`$GROVE_HOME`, else `~/.grove`), which holds the shared
//!   repository cache and `config.toml`;
//! - the project root, found by walking up from a starting directory until a
//!   `grove.yaml` is seen.

pub mod global;

pub use global::GlobalConfig;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::constants::{HOME_DIR_NAME, HOME_ENV, MANIFEST_FILE};
use crate::core::GroveError;
use crate::utils::platform::{get_home_dir, resolve_path};

/// The grove home directory.
///
/// `$GROVE_HOME` wins when set and non-empty; `~` and `$VAR` inside it are
/// expanded.
pub fn grove_home() -> Result<PathBuf> {
    if let Ok(value) = std::env::var(HOME_ENV)
        && !value.trim().is_empty()
    {
        return resolve_path(value.trim());
    }
    Ok(get_home_dir()?.join(HOME_DIR_NAME))
}

/// Walk up from `start` to the nearest directory containing `grove.yaml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(MANIFEST_FILE).is_file() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }
    Err(GroveError::ManifestNotFound.into())
}
