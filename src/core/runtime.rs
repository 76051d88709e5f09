//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: object store → bootstrap seed → controller → gateway
//! - Shutdown order: gateway → controller → object store

use crate::alloc::AllocationGateway;
use crate::api::{Claim, Object, Pool, Scope, Tenant};
use crate::core::config::Config;
use crate::core::error::IpamResult;
use crate::reconcile::Controller;
use crate::store::{MemoryStore, ObjectStore};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component is degraded but functional.
    Degraded,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Object store health.
    pub store: ComponentHealth,
    /// Reconcile controller health.
    pub controller: ComponentHealth,
    /// Allocation gateway health.
    pub gateway: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            store: ComponentHealth::Starting,
            controller: ComponentHealth::Starting,
            gateway: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.store, self.controller, self.gateway),
            (
                ComponentHealth::Healthy,
                ComponentHealth::Healthy,
                ComponentHealth::Healthy | ComponentHealth::Degraded
            )
        )
    }

    /// Check if the runtime is alive (not failed).
    pub fn is_alive(&self) -> bool {
        !matches!(
            (self.store, self.controller),
            (ComponentHealth::Failed, _) | (_, ComponentHealth::Failed)
        )
    }
}

/// Registry runtime holding all component handles.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Object store.
    store: Arc<MemoryStore>,

    /// Reconcile controller.
    controller: Option<Arc<Controller>>,

    /// Allocation gateway.
    gateway: Option<Arc<AllocationGateway>>,

    /// Runtime health status.
    health: RuntimeHealth,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,

    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,

    /// Controller task handle.
    controller_handle: Option<JoinHandle<IpamResult<()>>>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(MemoryStore::new()),
            controller: None,
            gateway: None,
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            controller_handle: None,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the object store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Get the controller (if started).
    pub fn controller(&self) -> Option<&Arc<Controller>> {
        self.controller.as_ref()
    }

    /// Get the allocation gateway (if started).
    pub fn gateway(&self) -> Option<&Arc<AllocationGateway>> {
        self.gateway.as_ref()
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.health.is_ready()
    }

    /// Check if the runtime is alive.
    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Initialize and start all runtime components.
    ///
    /// Components are started in order:
    /// 1. Object store and bootstrap seed
    /// 2. Reconcile controller
    /// 3. Allocation gateway
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            namespace = %self.config.bootstrap.namespace,
            concurrency = self.config.reconcile.concurrency,
            "starting IPAM registry runtime"
        );

        self.init_store().await?;
        self.init_controller().await?;
        self.init_gateway().await?;

        self.running.store(true, Ordering::Release);
        tracing::info!("IPAM registry runtime started");

        Ok(())
    }

    /// Seed the object store from the bootstrap section.
    async fn init_store(&mut self) -> Result<()> {
        tracing::debug!("seeding object store");

        let seeded = seed_bootstrap(self.store.as_ref(), &self.config)
            .context("failed to seed bootstrap resources")?;
        self.health.store = ComponentHealth::Healthy;

        tracing::info!(seeded, "object store initialized");
        Ok(())
    }

    /// Build the controller and spawn its workers.
    async fn init_controller(&mut self) -> Result<()> {
        tracing::debug!("starting reconcile controller");

        let store: Arc<dyn ObjectStore> = self.store.clone();
        let controller = Arc::new(Controller::new(store, self.config.reconcile.clone()));
        let shutdown_rx = self.shutdown_rx.clone();
        let handle = tokio::spawn(Arc::clone(&controller).run(shutdown_rx));

        self.controller = Some(controller);
        self.controller_handle = Some(handle);
        self.health.controller = ComponentHealth::Healthy;

        tracing::info!("reconcile controller started");
        Ok(())
    }

    /// Build the allocation gateway over the controller's allocator.
    async fn init_gateway(&mut self) -> Result<()> {
        let controller = self
            .controller
            .as_ref()
            .context("controller must start before the gateway")?;
        let gateway = AllocationGateway::new(
            Arc::clone(controller.allocator()),
            Arc::clone(controller.codec()),
        )
        .with_fanout(Arc::clone(controller.fanout()));

        self.gateway = Some(Arc::new(gateway));
        self.health.gateway = ComponentHealth::Healthy;
        tracing::info!("allocation gateway ready");
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for shutdown signal.
    pub async fn wait_for_shutdown(&mut self) {
        let mut rx = self.shutdown_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Run the runtime until shutdown.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await?;
        Ok(())
    }

    /// Stop all runtime components.
    ///
    /// Components are stopped in reverse order:
    /// 1. Allocation gateway
    /// 2. Reconcile controller
    /// 3. Object store
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping IPAM registry runtime");
        self.running.store(false, Ordering::Release);

        // Signal shutdown to all components
        let _ = self.shutdown_tx.send(true);

        self.health.gateway = ComponentHealth::Stopping;
        self.gateway = None;
        self.health.gateway = ComponentHealth::Stopped;

        self.stop_controller().await?;

        self.health.store = ComponentHealth::Stopped;
        tracing::info!("IPAM registry runtime stopped");
        Ok(())
    }

    /// Wait for the controller to drain its workers.
    async fn stop_controller(&mut self) -> Result<()> {
        tracing::debug!("stopping reconcile controller");
        self.health.controller = ComponentHealth::Stopping;

        if let Some(handle) = self.controller_handle.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(Ok(()))) => {
                    tracing::info!("reconcile controller stopped");
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!(error = %e, "reconcile controller stopped with error");
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "reconcile controller task panicked");
                }
                Err(_) => {
                    tracing::warn!("reconcile controller stop timed out");
                }
            }
        }

        self.health.controller = ComponentHealth::Stopped;
        Ok(())
    }

    /// Start the runtime for tests (without signal handling).
    pub async fn start_for_tests(&mut self) -> Result<()> {
        self.init_store().await?;
        self.init_controller().await?;
        self.init_gateway().await?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop the runtime for tests.
    pub async fn shutdown_for_tests(&mut self) -> Result<()> {
        self.stop().await
    }
}

/// Create every bootstrap resource that does not exist yet.
///
/// Returns the number of objects created.
pub fn seed_bootstrap(store: &dyn ObjectStore, config: &Config) -> IpamResult<usize> {
    let b = &config.bootstrap;
    let ns = b.namespace.as_str();

    let objects = b
        .tenants
        .iter()
        .map(|t| Object::from(Tenant::new(ns, &t.name, t.spec.clone())))
        .chain(b.scopes.iter().map(|s| Scope::new(ns, &s.name, s.spec.clone()).into()))
        .chain(b.pools.iter().map(|p| Pool::new(ns, &p.name, p.spec.clone()).into()))
        .chain(b.claims.iter().map(|c| Claim::new(ns, &c.name, c.spec.clone()).into()));

    let mut created = 0;
    for object in objects {
        let key = object.key();
        let kind = object.kind();
        match store.create(object) {
            Ok(_) => created += 1,
            Err(e) if e.is_conflict() => {
                tracing::debug!(kind = %kind, key = %key, "bootstrap resource already present");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}
