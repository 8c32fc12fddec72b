//! `grove install`: make `vendor/` match `grove.lock`.
//!
//! When `grove.lock` is missing or was produced from a different
//! `grove.yaml`, this behaves like `grove update`.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::core::GroveContext;
use crate::installer::{Installer, project};
use crate::vcs::VcsProvider;

#[derive(Args, Debug, Default)]
pub struct InstallCommand {
    /// Replace cached repositories whose VCS type or remote changed
    #[arg(short, long)]
    force: bool,

    /// Do not install test imports
    #[arg(long)]
    skip_test: bool,

    /// Leave dependencies' nested vendor/ and Godeps/_workspace/ out of vendor/
    #[arg(long)]
    strip_vendor: bool,
}

impl InstallCommand {
    /// Apply the command's flags to `ctx`.
    pub fn apply(&self, ctx: GroveContext) -> GroveContext {
        ctx.with_force(self.force)
            .with_resolve_test(!self.skip_test)
            .with_strip_vendor(self.strip_vendor)
    }

    pub async fn execute<P: VcsProvider>(self, ctx: GroveContext, vcs: P) -> Result<()> {
        let quiet = ctx.quiet();
        let installer = Installer::new(ctx, vcs);
        let outcome = project::install(&installer).await?;

        if !quiet {
            let count = outcome.lock.as_ref().map_or(0, |l| l.imports.len() + l.dev_imports.len());
            if outcome.failures.is_empty() {
                println!("{} {} dependencies", "Installed".green().bold(), count);
            } else {
                println!(
                    "{} {} dependencies, {} failed",
                    "Installed".yellow().bold(),
                    count - outcome.failures.len().min(count),
                    outcome.failures.len()
                );
            }
        }
        Ok(())
    }
}
