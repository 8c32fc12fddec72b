//! `grove update`: resolve, fetch and pin every dependency, then rewrite
//! `grove.lock` and `vendor/`.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::core::GroveContext;
use crate::installer::{Installer, project};
use crate::vcs::VcsProvider;

#[derive(Args, Debug, Default)]
pub struct UpdateCommand {
    /// Replace cached repositories whose VCS type or remote changed
    #[arg(short, long)]
    force: bool,

    /// Do not resolve or install test imports
    #[arg(long)]
    skip_test: bool,

    /// Resolve every package of every dependency, not only the imported ones
    #[arg(long)]
    all_dependencies: bool,

    /// Leave dependencies' nested vendor/ and Godeps/_workspace/ out of vendor/
    #[arg(long)]
    strip_vendor: bool,
}

impl UpdateCommand {
    /// Apply the command's flags to `ctx`.
    pub fn apply(&self, ctx: GroveContext) -> GroveContext {
        ctx.with_force(self.force)
            .with_resolve_test(!self.skip_test)
            .with_resolve_all_files(self.all_dependencies)
            .with_strip_vendor(self.strip_vendor)
    }

    pub async fn execute<P: VcsProvider>(self, ctx: GroveContext, vcs: P) -> Result<()> {
        let quiet = ctx.quiet();
        let installer = Installer::new(ctx, vcs);
        let outcome = project::update(&installer).await?;

        if !quiet {
            let status = if outcome.lock_written {
                "Updated".green().bold()
            } else {
                "Unchanged".cyan().bold()
            };
            println!("{} grove.lock", status);
            if !outcome.failures.is_empty() {
                println!("{} {} dependencies failed", "Warning:".yellow().bold(), outcome.failures.len());
            }
        }
        Ok(())
    }
}
