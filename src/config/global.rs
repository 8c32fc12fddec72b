//! User-wide settings stored in `<grove home>/config.toml`.
//!
//! ```toml
//! concurrency = 8
//! command-timeout = 600
//! ```
//!
//! Every key is optional; a missing file is the same as an empty one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::core::GroveContext;

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalConfig {
    /// Worker pool width for fetch/update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Per-command VCS timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<u64>,
}

impl GlobalConfig {
    /// Path of the config file under `home`.
    pub fn path_in(home: &Path) -> PathBuf {
        home.join("config.toml")
    }

    /// Load from `home`, falling back to defaults when the file is absent.
    pub async fn load(home: &Path) -> Result<Self> {
        let path = Self::path_in(home);
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))
    }

    /// Apply the configured values on top of `ctx`.
    #[must_use]
    pub fn apply(&self, mut ctx: GroveContext) -> GroveContext {
        if let Some(workers) = self.concurrency {
            ctx = ctx.with_concurrency(workers);
        }
        if let Some(secs) = self.command_timeout {
            ctx = ctx.with_command_timeout(Duration::from_secs(secs));
        }
        ctx
    }
}
