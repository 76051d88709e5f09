//! Config command implementation.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate configuration file.
    Validate {
        /// Config file path.
        #[arg(short, long, default_value = "config/ipam-registry.toml")]
        config: PathBuf,
    },
    /// Print configuration with defaults.
    Show {
        /// Config file path.
        #[arg(short, long, default_value = "config/ipam-registry.toml")]
        config: PathBuf,
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Validate { config } => validate_config(&config),
        ConfigCommand::Show { config, format } => show_config(&config, &format),
    }
}

fn validate_config(path: &Path) -> Result<()> {
    let config = load(path)?;
    let b = &config.bootstrap;
    println!("✓ Configuration is valid");
    println!(
        "  bootstrap namespace {}: {} tenants, {} scopes, {} pools, {} claims",
        b.namespace,
        b.tenants.len(),
        b.scopes.len(),
        b.pools.len(),
        b.claims.len()
    );
    if b.is_empty() {
        println!("  ⚠ Warning: no bootstrap resources; the registry will start empty");
    }
    Ok(())
}

fn show_config(path: &Path, format: &str) -> Result<()> {
    let config = load(path)?;
    let rendered = render(&config, format)?;
    println!("{}", rendered);
    Ok(())
}

fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }
    Config::from_file(path)
}

/// Render the effective configuration, defaults included.
pub(crate) fn render(config: &Config, format: &str) -> Result<String> {
    match format {
        "json" => serde_json::to_string_pretty(config).context("failed to render JSON"),
        "toml" => toml::to_string_pretty(config).context("failed to render TOML"),
        other => anyhow::bail!("unknown format: {} (expected toml or json)", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_defaults() {
        let config = Config::from_toml("[telemetry]\nlog_level = \"debug\"\n").unwrap();

        let json = render(&config, "json").unwrap();
        assert!(json.contains("\"poll_interval_seconds\": 60"));
        assert!(json.contains("\"log_level\": \"debug\""));

        let toml = render(&config, "toml").unwrap();
        assert!(toml.contains("[reconcile]"));
    }

    #[test]
    fn render_rejects_unknown_format() {
        assert!(render(&Config::default(), "yaml").is_err());
    }

    #[test]
    fn validate_reports_missing_file() {
        let err = validate_config(Path::new("/nonexistent/ipam.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
