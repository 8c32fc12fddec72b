//! `grove cache-clear`.

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::cache::Cache;
use crate::core::GroveContext;

#[derive(Args, Debug, Default)]
pub struct CacheClearCommand {}

impl CacheClearCommand {
    pub async fn execute(self, ctx: &GroveContext) -> Result<()> {
        let cache = Cache::new(ctx);
        cache.clear().await?;
        info!("Cache cleared at {}", cache.location().display());
        Ok(())
    }
}
