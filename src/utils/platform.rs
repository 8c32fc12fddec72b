//! Platform helpers: home directory lookup, path expansion, client discovery,
//! and the mapping from Rust target names to Go's `GOOS`/`GOARCH` vocabulary.

use anyhow::Result;
use std::path::PathBuf;

/// Checks if the current platform is Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// The user's home directory.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        let platform_help = if is_windows() {
            "On Windows: Check that the USERPROFILE environment variable is set"
        } else {
            "On Unix/Linux: Check that the HOME environment variable is set"
        };
        anyhow::anyhow!("Could not determine home directory.\n\n{platform_help}")
    })
}

/// Expand a leading `~/` and `$VAR`/`${VAR}` references in a path.
///
/// ```rust,no_run
/// use grove::utils::platform::resolve_path;
///
/// let cache = resolve_path("~/.grove/cache")?;
/// let custom = resolve_path("$XDG_CACHE_HOME/grove")?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = if let Some(stripped) = path.strip_prefix("~/") {
        get_home_dir()?.join(stripped)
    } else if path == "~" {
        get_home_dir()?
    } else if path.starts_with('~') {
        return Err(anyhow::anyhow!(
            "Invalid path: {path}\n\n\
            Tilde expansion only supports '~/' for home directory."
        ));
    } else {
        PathBuf::from(path)
    };

    let path_str = expanded.to_string_lossy();
    let expanded_str = shellexpand::env(&path_str)
        .map_err(|e| anyhow::anyhow!("Failed to expand environment variables in {path}: {e}"))?;

    Ok(PathBuf::from(expanded_str.as_ref()))
}

/// Whether an executable is reachable on `PATH`.
#[must_use]
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Go's name for the host operating system.
#[must_use]
pub fn host_goos() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Go's name for the host architecture.
#[must_use]
pub fn host_goarch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc" => "ppc",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        "mips" if cfg!(target_endian = "little") => "mipsle",
        "mips64" if cfg!(target_endian = "little") => "mips64le",
        "sparc64" => "sparc64",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path_plain() {
        let p = resolve_path("/tmp/grove").unwrap();
        assert_eq!(p, PathBuf::from("/tmp/grove"));
    }

    #[test]
    fn test_resolve_path_tilde() {
        let home = get_home_dir().unwrap();
        assert_eq!(resolve_path("~/x").unwrap(), home.join("x"));
    }

    #[test]
    fn test_resolve_path_rejects_other_user() {
        assert!(resolve_path("~bob/x").is_err());
    }

    #[test]
    fn test_host_names_are_go_names() {
        assert_ne!(host_goos(), "macos");
        assert_ne!(host_goarch(), "x86_64");
        assert_ne!(host_goarch(), "aarch64");
    }
}
