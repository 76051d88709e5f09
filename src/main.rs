//! IPAM registry - unified CLI entrypoint.
//!
//! Usage:
//!   ipam-registry start --config config/ipam-registry.toml
//!   ipam-registry config validate --config config/ipam-registry.toml
//!   ipam-registry config show --config config/ipam-registry.toml --format json

use anyhow::Result;
use clap::Parser;
use ipam_registry::cli::commands::{run_config, run_start};
use ipam_registry::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.map(PathBuf::from);

    match cli.command {
        Commands::Start(args) => run_start(config_path.as_deref(), cli.log_level, args).await,
        Commands::Config(args) => run_config(args),
    }
}
