//! Start command implementation.

use crate::cli::init_tracing;
use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

/// Start the registry.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Reconcile workers per resource kind.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Poll interval in seconds for converged resources.
    #[arg(long)]
    pub poll_interval_seconds: Option<u64>,
}

/// Run the start command.
///
/// Without a config file the registry starts with defaults and an empty
/// store.
pub async fn run_start(
    config_path: Option<&Path>,
    log_level: Option<String>,
    args: StartArgs,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None => Config::default(),
    };
    config.apply_overrides(&ConfigOverrides {
        log_level,
        concurrency: args.concurrency,
        poll_interval_seconds: args.poll_interval_seconds,
    });

    init_tracing(&config.telemetry.log_level);

    let mut runtime = Runtime::new(config)?;
    runtime.run().await
}
