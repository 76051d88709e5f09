//! Configuration parsing and validation.
//!
//! Configuration is loaded from TOML files with CLI overrides. Every section
//! is optional; an empty file yields a runnable registry with an empty store.

use crate::api::{ClaimSpec, PoolSpec, ScopeSpec, TenantSpec};
use crate::index::parse_prefix;
use crate::registry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level registry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Reconciliation scheduling.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Logging.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Resources seeded into the store at startup.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Reconciliation scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Workers per resource kind.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Standard requeue interval, also the top of the retry ladder.
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Retry delay while the ladder counter is below its cap.
    #[serde(default = "default_short_wait_seconds")]
    pub short_wait_seconds: u64,

    /// Retry delay at the bottom of the ladder.
    #[serde(default = "default_very_short_wait_seconds")]
    pub very_short_wait_seconds: u64,

    /// Ladder counter ceiling.
    #[serde(default = "default_retry_cap")]
    pub retry_cap: u32,

    /// Deadline for one reconcile attempt.
    #[serde(default = "default_reconcile_timeout_seconds")]
    pub reconcile_timeout_seconds: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_seconds: default_poll_interval_seconds(),
            short_wait_seconds: default_short_wait_seconds(),
            very_short_wait_seconds: default_very_short_wait_seconds(),
            retry_cap: default_retry_cap(),
            reconcile_timeout_seconds: default_reconcile_timeout_seconds(),
        }
    }
}

impl ReconcileConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            very_short: Duration::from_secs(self.very_short_wait_seconds),
            short: Duration::from_secs(self.short_wait_seconds),
            poll_interval: self.poll_interval(),
            cap: self.retry_cap,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Resources created in the store when the runtime starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Namespace for every seeded resource.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub tenants: Vec<TenantSeed>,

    #[serde(default)]
    pub scopes: Vec<ScopeSeed>,

    #[serde(default)]
    pub pools: Vec<PoolSeed>,

    #[serde(default)]
    pub claims: Vec<ClaimSeed>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            tenants: Vec::new(),
            scopes: Vec::new(),
            pools: Vec::new(),
            claims: Vec::new(),
        }
    }
}

impl BootstrapConfig {
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
            && self.scopes.is_empty()
            && self.pools.is_empty()
            && self.claims.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSeed {
    pub name: String,
    #[serde(flatten)]
    pub spec: TenantSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSeed {
    pub name: String,
    #[serde(flatten)]
    pub spec: ScopeSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSeed {
    pub name: String,
    #[serde(flatten)]
    pub spec: PoolSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSeed {
    pub name: String,
    #[serde(flatten)]
    pub spec: ClaimSpec,
}

// Default value functions

fn default_concurrency() -> usize {
    1
}

fn default_poll_interval_seconds() -> u64 {
    60
}

fn default_short_wait_seconds() -> u64 {
    5
}

fn default_very_short_wait_seconds() -> u64 {
    1
}

fn default_retry_cap() -> u32 {
    3
}

fn default_reconcile_timeout_seconds() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(concurrency) = overrides.concurrency {
            self.reconcile.concurrency = concurrency;
        }
        if let Some(poll_interval_seconds) = overrides.poll_interval_seconds {
            self.reconcile.poll_interval_seconds = poll_interval_seconds;
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_reconcile()?;
        self.validate_telemetry()?;
        self.validate_bootstrap()?;
        Ok(())
    }

    fn validate_reconcile(&self) -> Result<()> {
        let r = &self.reconcile;
        if r.concurrency == 0 {
            anyhow::bail!("reconcile.concurrency must be > 0");
        }
        if r.poll_interval_seconds == 0 {
            anyhow::bail!("reconcile.poll_interval_seconds must be > 0");
        }
        if r.reconcile_timeout_seconds == 0 {
            anyhow::bail!("reconcile.reconcile_timeout_seconds must be > 0");
        }
        if r.retry_cap == 0 {
            anyhow::bail!("reconcile.retry_cap must be > 0");
        }

        // The ladder must escalate, never shrink.
        if r.very_short_wait_seconds > r.short_wait_seconds {
            anyhow::bail!(
                "reconcile.very_short_wait_seconds ({}) cannot exceed short_wait_seconds ({})",
                r.very_short_wait_seconds,
                r.short_wait_seconds
            );
        }
        if r.short_wait_seconds > r.poll_interval_seconds {
            anyhow::bail!(
                "reconcile.short_wait_seconds ({}) cannot exceed poll_interval_seconds ({})",
                r.short_wait_seconds,
                r.poll_interval_seconds
            );
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }

    fn validate_bootstrap(&self) -> Result<()> {
        let b = &self.bootstrap;
        if b.namespace.is_empty() {
            anyhow::bail!("bootstrap.namespace must not be empty");
        }

        let names = b
            .tenants
            .iter()
            .map(|t| ("tenant", &t.name))
            .chain(b.scopes.iter().map(|s| ("scope", &s.name)))
            .chain(b.pools.iter().map(|p| ("pool", &p.name)))
            .chain(b.claims.iter().map(|c| ("claim", &c.name)));
        for (kind, name) in names {
            if name.is_empty() {
                anyhow::bail!("bootstrap {} name must not be empty", kind);
            }
        }

        for scope in &b.scopes {
            scope
                .spec
                .validate()
                .with_context(|| format!("bootstrap scope {}", scope.name))?;
        }
        for pool in &b.pools {
            parse_prefix(&pool.spec.prefix)
                .with_context(|| format!("bootstrap pool {}", pool.name))?;
        }
        for claim in &b.claims {
            if let Some(ref prefix) = claim.spec.prefix {
                parse_prefix(prefix).with_context(|| format!("bootstrap claim {}", claim.name))?;
            }
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override workers per kind.
    pub concurrency: Option<usize>,
    /// Override poll interval.
    pub poll_interval_seconds: Option<u64>,
}
