//! Command-line interface for grove.
//!
//! # Available Commands
//!
//! - `install` - Install the versions in `grove.lock`, or update when the
//!   lock does not match `grove.yaml`
//! - `update` - Resolve imports, fetch and pin every dependency, rewrite
//!   `grove.lock`
//! - `list` - Show the packages the project imports and where they were found
//! - `cache-clear` - Empty the shared repository cache
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output
//! - `--quiet` - Only print warnings and errors
//! - `--home` - Use another grove home directory (default `$GROVE_HOME` or `~/.grove`)
//!
//! `RUST_LOG` overrides the level chosen by `--verbose`/`--quiet`.
//!
//! # Example
//!
//! ```bash
//! grove update --skip-test
//! grove --verbose install
//! ```

mod cache;
mod install;
mod list;
mod update;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use crate::config::{GlobalConfig, find_project_root, grove_home};
use crate::core::GroveContext;
use crate::utils::resolve_path;
use crate::vcs::{CliVcs, ImportDiscovery};

/// Vendoring dependency manager for Go projects.
#[derive(Parser, Debug)]
#[command(
    name = "grove",
    about = "Vendoring dependency manager for Go projects",
    version,
    long_about = "grove resolves a Go project's imports, fetches every dependency into a shared cache, pins the versions in grove.lock and copies them into vendor/."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// grove home directory holding the cache and config.toml
    #[arg(long, global = true, env = "GROVE_HOME", value_name = "DIR")]
    home: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the versions in grove.lock into vendor/
    Install(install::InstallCommand),

    /// Update dependencies and rewrite grove.lock
    Update(update::UpdateCommand),

    /// List the packages the project imports
    List(list::ListCommand),

    /// Remove everything from the repository cache
    #[command(name = "cache-clear", visible_alias = "cc")]
    CacheClear(cache::CacheClearCommand),
}

impl Cli {
    /// Run the parsed command.
    pub async fn execute(self) -> Result<()> {
        self.init_logging();

        let home = match &self.home {
            Some(dir) if !dir.trim().is_empty() => resolve_path(dir.trim())?,
            _ => grove_home()?,
        };
        let global = GlobalConfig::load(&home).await?;

        match self.command {
            Commands::CacheClear(cmd) => {
                let ctx = global.apply(GroveContext::new(&home, "."));
                cmd.execute(&ctx).await
            }
            Commands::Install(cmd) => {
                let ctx = cmd.apply(project_context(&home, &global, self.quiet, self.verbose)?);
                let vcs = vcs_for(&ctx);
                cmd.execute(ctx, vcs).await
            }
            Commands::Update(cmd) => {
                let ctx = cmd.apply(project_context(&home, &global, self.quiet, self.verbose)?);
                let vcs = vcs_for(&ctx);
                cmd.execute(ctx, vcs).await
            }
            Commands::List(cmd) => {
                let ctx = project_context(&home, &global, self.quiet, self.verbose)?;
                cmd.execute(&ctx, &vcs_for(&ctx)).await
            }
        }
    }

    /// Level implied by the flags, for when `RUST_LOG` is unset.
    fn default_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    fn init_logging(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_level()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(self.verbose)
            .without_time()
            .try_init();
    }
}

/// Context for the project containing the current directory.
fn project_context(home: &Path, global: &GlobalConfig, quiet: bool, verbose: bool) -> Result<GroveContext> {
    let cwd = std::env::current_dir()?;
    let root = find_project_root(&cwd)?;
    let ctx = GroveContext::new(home, root).with_verbosity(quiet, verbose);
    Ok(global.apply(ctx))
}

fn vcs_for(ctx: &GroveContext) -> CliVcs {
    CliVcs::new(ImportDiscovery::new()).with_timeout(ctx.command_timeout())
}
