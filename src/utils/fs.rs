//! Filesystem helpers for moving working copies between the cache and `vendor/`.

use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Metadata directories of the supported VCS clients.
pub const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn", ".bzr"];

/// True when `dir` exists and has no entries.
pub fn is_dir_empty(dir: &Path) -> Result<bool> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;
    Ok(entries.next().is_none())
}

/// Recursively copy `from` into `to`, leaving out VCS metadata directories.
///
/// With `strip_vendor`, nested `vendor/` and `Godeps/_workspace/`
/// directories are left out as well. `to` is created if needed. Symlinks are
/// recreated on Unix and followed elsewhere.
pub fn copy_dir_without_vcs(from: &Path, to: &Path, strip_vendor: bool) -> Result<()> {
    std::fs::create_dir_all(to)
        .with_context(|| format!("Failed to create directory {}", to.display()))?;

    let walker = WalkDir::new(from)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry, strip_vendor));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", from.display()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .with_context(|| format!("{} is not under {}", entry.path().display(), from.display()))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory {}", target.display()))?;
        } else if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }

    Ok(())
}

fn is_skipped(entry: &walkdir::DirEntry, strip_vendor: bool) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let Some(name) = entry.file_name().to_str() else {
        return false;
    };
    if VCS_DIRS.contains(&name) {
        return true;
    }
    strip_vendor
        && (name == "vendor"
            || (name == "_workspace"
                && entry.path().parent().and_then(Path::file_name).is_some_and(|p| p == "Godeps")))
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = std::fs::read_link(src)
        .with_context(|| format!("Failed to read symlink {}", src.display()))?;
    std::os::unix::fs::symlink(&link, dst)
        .with_context(|| format!("Failed to create symlink {}", dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    std::fs::copy(src, dst)
        .map(|_| ())
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))
}

/// Write `content` to `path` through a sibling temp file and a rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    temp.as_file().sync_all().context("Failed to sync file to disk")?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;
    Ok(())
}

/// Rename `from` to `to`, falling back to copy + delete across filesystems.
pub fn move_dir(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!("Rename of {} failed ({}), copying instead", from.display(), e);
            copy_dir_all(from, to)?;
            std::fs::remove_dir_all(from)
                .with_context(|| format!("Failed to remove {}", from.display()))
        }
    }
}

fn copy_dir_all(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.with_context(|| format!("Failed to walk {}", from.display()))?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory {}", target.display()))?;
        } else if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_skips_vcs_dirs() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join(".git/objects")).unwrap();
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("a.go"), "package a").unwrap();
        std::fs::write(src.join("sub/b.go"), "package sub").unwrap();
        std::fs::write(src.join(".git/HEAD"), "ref").unwrap();

        let dst = temp.path().join("dst");
        copy_dir_without_vcs(&src, &dst, false).unwrap();

        assert!(dst.join("a.go").exists());
        assert!(dst.join("sub/b.go").exists());
        assert!(!dst.join(".git").exists());
    }

    #[test]
    fn test_copy_strips_nested_vendor() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("vendor/example.com/x")).unwrap();
        std::fs::create_dir_all(src.join("cmd/vendor")).unwrap();
        std::fs::create_dir_all(src.join("Godeps/_workspace/src")).unwrap();
        std::fs::create_dir_all(src.join("_workspace")).unwrap();
        std::fs::write(src.join("a.go"), "package a").unwrap();
        std::fs::write(src.join("vendor/example.com/x/x.go"), "package x").unwrap();
        std::fs::write(src.join("Godeps/Godeps.json"), "{}").unwrap();
        std::fs::write(src.join("_workspace/keep.go"), "package w").unwrap();

        let kept = temp.path().join("kept");
        copy_dir_without_vcs(&src, &kept, false).unwrap();
        assert!(kept.join("vendor/example.com/x/x.go").exists());
        assert!(kept.join("Godeps/_workspace/src").exists());

        let stripped = temp.path().join("stripped");
        copy_dir_without_vcs(&src, &stripped, true).unwrap();
        assert!(stripped.join("a.go").exists());
        assert!(!stripped.join("vendor").exists());
        assert!(!stripped.join("cmd/vendor").exists());
        assert!(stripped.join("Godeps/Godeps.json").exists());
        assert!(!stripped.join("Godeps/_workspace").exists());
        assert!(stripped.join("_workspace/keep.go").exists());
    }

    #[test]
    fn test_is_dir_empty() {
        let temp = TempDir::new().unwrap();
        assert!(is_dir_empty(temp.path()).unwrap());
        std::fs::write(temp.path().join("f"), "").unwrap();
        assert!(!is_dir_empty(temp.path()).unwrap());
    }

    #[test]
    fn test_atomic_write_replaces() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/out.yaml");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn test_move_dir() {
        let temp = TempDir::new().unwrap();
        let from = temp.path().join("from");
        std::fs::create_dir_all(from.join("x")).unwrap();
        std::fs::write(from.join("x/f.txt"), "hi").unwrap();
        let to = temp.path().join("to");
        move_dir(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(to.join("x/f.txt")).unwrap(), "hi");
    }
}
