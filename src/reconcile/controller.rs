//! Reconcile controller.
//!
//! Wires the four drivers to their work queues and the store's change
//! stream:
//!
//! - a watch pump turns spec changes into queue adds and fan-out;
//! - `concurrency` workers per kind pull keys, reconcile on the blocking pool
//!   under a timeout and schedule the next pass.

use super::capability::Capability;
use super::claim::ClaimCapability;
use super::driver::{Driver, ReconcileOutcome};
use super::fanout::{FanOut, Queues};
use super::pool::PoolCapability;
use super::scope::ScopeCapability;
use super::tenant::TenantCapability;
use crate::alloc::Allocator;
use crate::api::meta::{ObjectKey, ResourceKind};
use crate::api::{DottedNameCodec, NameCodec};
use crate::core::config::ReconcileConfig;
use crate::core::error::IpamResult;
use crate::registry::{LadderStats, RegistryStats, RetryLadder, ScopeRegistry};
use crate::store::{ObjectStore, WatchEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Snapshot of controller state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub registry: RegistryStats,
    pub ladder: LadderStats,
    /// Keys waiting in the work queues.
    pub queued: usize,
    /// Keys with a pending delayed requeue.
    pub scheduled: usize,
}

pub struct Controller {
    config: ReconcileConfig,
    store: Arc<dyn ObjectStore>,
    registry: Arc<ScopeRegistry>,
    allocator: Arc<Allocator>,
    codec: Arc<dyn NameCodec>,
    ladder: Arc<RetryLadder>,
    queues: Arc<Queues>,
    fanout: Arc<FanOut>,
    tenants: Driver<TenantCapability>,
    scopes: Driver<ScopeCapability>,
    pools: Driver<PoolCapability>,
    claims: Driver<ClaimCapability>,
}

impl Controller {
    /// Controller over `store` using dotted resource names.
    pub fn new(store: Arc<dyn ObjectStore>, config: ReconcileConfig) -> Self {
        Self::with_codec(store, Arc::new(DottedNameCodec), config)
    }

    pub fn with_codec(
        store: Arc<dyn ObjectStore>,
        codec: Arc<dyn NameCodec>,
        config: ReconcileConfig,
    ) -> Self {
        let ladder = Arc::new(RetryLadder::new(config.retry_policy()));
        let registry = Arc::new(ScopeRegistry::new(Arc::clone(&ladder)));
        let allocator = Arc::new(Allocator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&codec),
        ));
        let queues = Arc::new(Queues::new());
        let fanout = Arc::new(FanOut::new(
            Arc::clone(&store),
            Arc::clone(&ladder),
            Arc::clone(&codec),
            Arc::clone(&queues),
        ));

        let tenants = driver_for(TenantCapability, &store, &codec, &ladder, &fanout);
        let scopes = driver_for(
            ScopeCapability::new(Arc::clone(&store), Arc::clone(&registry), Arc::clone(&codec)),
            &store,
            &codec,
            &ladder,
            &fanout,
        );
        let pools = driver_for(
            PoolCapability::new(Arc::clone(&allocator), Arc::clone(&codec)),
            &store,
            &codec,
            &ladder,
            &fanout,
        );
        let claims = driver_for(
            ClaimCapability::new(Arc::clone(&allocator), Arc::clone(&codec)),
            &store,
            &codec,
            &ladder,
            &fanout,
        );

        Self {
            config,
            store,
            registry,
            allocator,
            codec,
            ladder,
            queues,
            fanout,
            tenants,
            scopes,
            pools,
            claims,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    pub fn allocator(&self) -> &Arc<Allocator> {
        &self.allocator
    }

    pub fn codec(&self) -> &Arc<dyn NameCodec> {
        &self.codec
    }

    pub fn ladder(&self) -> &Arc<RetryLadder> {
        &self.ladder
    }

    pub fn queues(&self) -> &Arc<Queues> {
        &self.queues
    }

    pub fn fanout(&self) -> &Arc<FanOut> {
        &self.fanout
    }

    /// Reconcile one object synchronously.
    pub fn reconcile_once(&self, kind: ResourceKind, key: &ObjectKey) -> IpamResult<ReconcileOutcome> {
        match kind {
            ResourceKind::Tenant => self.tenants.reconcile(key),
            ResourceKind::Scope => self.scopes.reconcile(key),
            ResourceKind::Pool => self.pools.reconcile(key),
            ResourceKind::Claim => self.claims.reconcile(key),
        }
    }

    /// Reconcile every stored object once, parents first, and repeat until a
    /// full round changes no readiness or `rounds` is reached.
    ///
    /// Returns the number of rounds run. Used at startup without workers and
    /// by tests.
    pub fn converge(&self, rounds: usize) -> IpamResult<usize> {
        for round in 1..=rounds {
            let mut changed = false;
            for kind in ResourceKind::ALL {
                for object in self.store.list(kind, None)? {
                    let was_ready = object.status().is_ready();
                    let outcome = self.reconcile_once(kind, &object.key())?;
                    changed |= outcome.ready != was_ready;
                }
            }
            if !changed {
                return Ok(round);
            }
        }
        Ok(rounds)
    }

    /// Queue every stored object.
    pub fn enqueue_all(&self) -> IpamResult<usize> {
        let mut queued = 0;
        for kind in ResourceKind::ALL {
            let queue = self.queues.get(kind);
            for object in self.store.list(kind, None)? {
                queue.add(object.key());
                queued += 1;
            }
        }
        Ok(queued)
    }

    pub fn stats(&self) -> ControllerStats {
        let mut queued = 0;
        let mut scheduled = 0;
        for kind in ResourceKind::ALL {
            let queue = self.queues.get(kind);
            queued += queue.len();
            scheduled += queue.scheduled();
        }
        ControllerStats {
            registry: self.registry.stats(),
            ladder: self.ladder.stats(),
            queued,
            scheduled,
        }
    }

    /// Run workers and the watch pump until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> IpamResult<()> {
        // Subscribe before the initial listing so nothing falls in between.
        let mut events = self.store.watch();
        let queued = self.enqueue_all()?;

        let concurrency = self.config.concurrency.max(1);
        let mut workers = Vec::with_capacity(ResourceKind::ALL.len() * concurrency);
        for kind in ResourceKind::ALL {
            for _ in 0..concurrency {
                workers.push(tokio::spawn(Arc::clone(&self).worker(kind)));
            }
        }
        tracing::info!(queued, concurrency, "controller started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => self.on_event(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "watch lagged; re-queueing everything");
                        if let Err(e) = self.enqueue_all() {
                            tracing::warn!(error = %e, "re-queue failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("watch stream closed");
                        break;
                    }
                },
            }
        }

        self.queues.shutdown();
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "worker task failed");
            }
        }
        tracing::info!("controller stopped");
        Ok(())
    }

    fn on_event(&self, event: WatchEvent) {
        if !event.change.is_spec_change() {
            return;
        }
        tracing::debug!(kind = %event.kind, key = %event.key, change = ?event.change, "watch event");
        self.ladder.reset(&event.kind.retry_name(&event.key));
        self.queues.get(event.kind).add(event.key.clone());
        if let Err(e) = self.fanout.propagate(event.kind, &event.key) {
            tracing::warn!(kind = %event.kind, key = %event.key, error = %e, "fan-out failed");
        }
    }

    async fn worker(self: Arc<Self>, kind: ResourceKind) {
        let queue = Arc::clone(self.queues.get(kind));
        let timeout = self.config.reconcile_timeout();

        while let Some(key) = queue.next().await {
            let this = Arc::clone(&self);
            let task_key = key.clone();
            let mut task = tokio::task::spawn_blocking(move || this.reconcile_once(kind, &task_key));

            let requeue_after = match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(Ok(outcome))) => outcome.requeue_after,
                Ok(Ok(Err(e))) => {
                    tracing::warn!(kind = %kind, key = %key, error = %e, "reconcile failed");
                    Some(self.backoff(kind, &key))
                }
                Ok(Err(e)) => {
                    tracing::error!(kind = %kind, key = %key, error = %e, "reconcile task panicked");
                    Some(self.backoff(kind, &key))
                }
                Err(_) => {
                    tracing::warn!(
                        kind = %kind,
                        key = %key,
                        timeout_secs = timeout.as_secs(),
                        "reconcile abandoned after timeout"
                    );
                    // A blocking task cannot be cancelled. The key stays in
                    // processing until it returns so no second pass overlaps it.
                    let delay = self.backoff(kind, &key);
                    let queue = Arc::clone(&queue);
                    tokio::spawn(async move {
                        let _ = task.await;
                        queue.done(&key);
                        queue.add_after(key, delay);
                    });
                    continue;
                }
            };

            queue.done(&key);
            if let Some(delay) = requeue_after {
                queue.add_after(key, delay);
            }
        }
    }

    fn backoff(&self, kind: ResourceKind, key: &ObjectKey) -> Duration {
        self.ladder.next_delay(&kind.retry_name(key))
    }
}

fn driver_for<C: Capability>(
    capability: C,
    store: &Arc<dyn ObjectStore>,
    codec: &Arc<dyn NameCodec>,
    ladder: &Arc<RetryLadder>,
    fanout: &Arc<FanOut>,
) -> Driver<C> {
    Driver::new(
        capability,
        Arc::clone(store),
        Arc::clone(codec),
        Arc::clone(ladder),
        Arc::clone(fanout),
    )
}
