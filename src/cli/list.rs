//! `grove list`: show what the project imports and where it was found.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::core::GroveContext;
use crate::installer::project;
use crate::vcs::VcsProvider;

#[derive(Args, Debug, Default)]
pub struct ListCommand {
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl ListCommand {
    pub async fn execute<P: VcsProvider>(self, ctx: &GroveContext, vcs: &P) -> Result<()> {
        let listing = project::list(ctx, vcs).await?;

        if self.json {
            let report = serde_json::json!({
                "installed": listing.installed,
                "gopath": listing.gopath,
                "missing": listing.missing,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("{}", "INSTALLED packages:".bold());
        for name in &listing.installed {
            println!("\t{name}");
        }
        if !listing.gopath.is_empty() {
            println!("\n{}", "Found on GOPATH:".yellow().bold());
            for name in &listing.gopath {
                println!("\t{name}");
            }
        }
        if !listing.missing.is_empty() {
            println!("\n{}", "MISSING packages:".red().bold());
            for name in &listing.missing {
                println!("\t{name}");
            }
        }
        Ok(())
    }
}
