//! Per-key advisory file locks for the shared cache.
//!
//! One repository in the cache may be touched by several workers of one run
//! and by other grove processes at the same time. Every fetch, update and
//! ref listing of a key happens while holding `<cache>/.locks/<key>.lock`.
//!
//! # Async Safety
//!
//! Opening and polling the lock file run in `spawn_blocking`, so a worker
//! waiting for a busy key never stalls the runtime.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

use crate::constants::{DEFAULT_LOCK_TIMEOUT, MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};

/// Exclusive lock on one cache key. Released when dropped.
#[derive(Debug)]
pub struct CacheLock {
    _file: Arc<File>,
    key: String,
    path: PathBuf,
}

impl CacheLock {
    /// Acquire the lock for `key`, waiting up to the default timeout.
    pub async fn acquire(cache_dir: &Path, key: &str) -> Result<Self> {
        Self::acquire_with_timeout(cache_dir, key, DEFAULT_LOCK_TIMEOUT).await
    }

    /// Acquire the lock for `key`, polling with exponential backoff until `timeout`.
    pub async fn acquire_with_timeout(cache_dir: &Path, key: &str, timeout: Duration) -> Result<Self> {
        debug!(key = %key, "Waiting for cache lock");

        let locks_dir = cache_dir.join(".locks");
        tokio::fs::create_dir_all(&locks_dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                anyhow::anyhow!("Permission denied: cannot create locks directory at {}", locks_dir.display())
            } else {
                anyhow::anyhow!("Failed to create directory {}: {}", locks_dir.display(), e)
            }
        })?;

        let path = locks_dir.join(format!("{key}.lock"));
        let open_path = path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .context("spawn_blocking panicked")?
        .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
        let file = Arc::new(file);

        let start = std::time::Instant::now();
        let backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        for delay in backoff {
            let handle = Arc::clone(&file);
            let locked = tokio::task::spawn_blocking(move || handle.try_lock_exclusive())
                .await
                .context("spawn_blocking panicked")?;

            if let Ok(true) = locked {
                debug!(key = %key, wait_ms = start.elapsed().as_millis(), "Cache lock acquired");
                return Ok(Self {
                    _file: file,
                    key: key.to_string(),
                    path,
                });
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(delay.min(remaining)).await;
        }

        Err(anyhow::anyhow!("Timeout acquiring cache lock '{}' after {:?}", key, timeout))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        // The lock file itself stays; other processes may be waiting on it
        #[allow(unstable_name_collisions)]
        if let Err(e) = self._file.unlock() {
            tracing::warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
        debug!(key = %self.key, "Cache lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cache_lock_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path();

        let lock = CacheLock::acquire(cache_dir, "https-github.com-pkg-errors").await.unwrap();
        let lock_path = cache_dir.join(".locks").join("https-github.com-pkg-errors.lock");
        assert!(lock_path.exists());
        assert_eq!(lock.key(), "https-github.com-pkg-errors");

        drop(lock);
        assert!(lock_path.exists());

        // Reacquirable once released
        let _again = CacheLock::acquire(cache_dir, "https-github.com-pkg-errors").await.unwrap();
    }

    #[tokio::test]
    async fn test_cache_lock_exclusive_blocking() {
        use std::time::Instant;
        use tokio::sync::Barrier;

        let temp_dir = TempDir::new().unwrap();
        let cache_dir = Arc::new(temp_dir.path().to_path_buf());
        let barrier = Arc::new(Barrier::new(2));

        let dir1 = cache_dir.clone();
        let barrier1 = barrier.clone();
        let holder = tokio::spawn(async move {
            let _lock = CacheLock::acquire(&dir1, "same-key").await.unwrap();
            barrier1.wait().await;
            tokio::time::sleep(Duration::from_millis(150)).await;
        });

        let dir2 = cache_dir.clone();
        let waiter = tokio::spawn(async move {
            barrier.wait().await;
            let start = Instant::now();
            let _lock = CacheLock::acquire(&dir2, "same-key").await.unwrap();
            assert!(start.elapsed() >= Duration::from_millis(50));
        });

        holder.await.unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_cache_lock_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let _held = CacheLock::acquire(temp_dir.path(), "busy").await.unwrap();

        let err = CacheLock::acquire_with_timeout(temp_dir.path(), "busy", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Timeout acquiring cache lock"));
    }

    #[tokio::test]
    async fn test_cache_lock_different_keys_dont_block() {
        let temp_dir = TempDir::new().unwrap();
        let _a = CacheLock::acquire(temp_dir.path(), "key-a").await.unwrap();
        let _b = CacheLock::acquire_with_timeout(temp_dir.path(), "key-b", Duration::from_millis(200))
            .await
            .unwrap();
    }
}
