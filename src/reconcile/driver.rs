//! Generic reconciliation driver.
//!
//! One [`Driver`] per kind, parameterized by its [`Capability`]. A single
//! pass: fetch, finalize if deletion was requested, ensure the finalizer,
//! decode identity, check the parent, apply, write status, fan out on
//! observable change, and pick the next delay.

use super::capability::Capability;
use super::fanout::FanOut;
use super::phase::ResourcePhase;
use crate::api::meta::{ObjectKey, FINALIZER};
use crate::api::object::Resource;
use crate::api::NameCodec;
use crate::core::error::{IpamError, IpamResult};
use crate::registry::RetryLadder;
use crate::store::{fetch, ObjectStore};
use std::sync::Arc;
use std::time::Duration;

/// Result of one reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub phase: ResourcePhase,
    pub ready: bool,
    /// Stable reason of the failure, if any.
    pub reason: Option<&'static str>,
    /// When to reconcile again. `None` once the object is gone.
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    fn removed() -> Self {
        Self {
            phase: ResourcePhase::Removed,
            ready: false,
            reason: None,
            requeue_after: None,
        }
    }
}

/// Reconciler for one resource kind.
pub struct Driver<C: Capability> {
    capability: C,
    store: Arc<dyn ObjectStore>,
    codec: Arc<dyn NameCodec>,
    ladder: Arc<RetryLadder>,
    fanout: Arc<FanOut>,
}

impl<C: Capability> Driver<C> {
    pub fn new(
        capability: C,
        store: Arc<dyn ObjectStore>,
        codec: Arc<dyn NameCodec>,
        ladder: Arc<RetryLadder>,
        fanout: Arc<FanOut>,
    ) -> Self {
        Self {
            capability,
            store,
            codec,
            ladder,
            fanout,
        }
    }

    pub fn capability(&self) -> &C {
        &self.capability
    }

    /// Run one reconcile pass for `key`.
    ///
    /// Only store failures are returned as errors; resource-level failures
    /// are recorded on the resource status and reflected in the outcome.
    pub fn reconcile(&self, key: &ObjectKey) -> IpamResult<ReconcileOutcome> {
        let kind = C::Resource::KIND;
        let retry_name = kind.retry_name(key);

        let Some(mut resource) = fetch::<C::Resource>(self.store.as_ref(), key)? else {
            self.ladder.forget(&retry_name);
            return Ok(ReconcileOutcome::removed());
        };

        if resource.meta().deletion_requested {
            return self.finalize(resource, &retry_name);
        }

        if !resource.meta().has_finalizer(FINALIZER) {
            self.store.add_finalizer(kind, key, FINALIZER)?;
            resource.meta_mut().finalizers.push(FINALIZER.to_string());
        }

        let before = resource.clone();
        let result = self.evaluate(&mut resource);

        let generation = resource.meta().generation;
        let status = resource.status_mut();
        status.observed_generation = generation;
        let reason = match &result {
            Ok(()) => {
                status.phase = ResourcePhase::Ready;
                status.condition.set(true, "Ready", "");
                None
            }
            Err((phase, e)) => {
                status.phase = *phase;
                status.condition.set(false, e.reason(), e.to_string());
                Some(e.reason())
            }
        };
        let ready = result.is_ok();
        let phase = resource.status().phase;

        let observed = resource.clone().into_object();
        if observed != before.clone().into_object() {
            self.store.update_status(&observed)?;
        }

        let flipped = before.status().is_ready() != ready;
        if flipped {
            tracing::info!(kind = %kind, key = %key, ready, phase = %phase, "readiness changed");
        }
        if flipped || self.capability.observed_changed(&before, &resource) {
            if let Err(e) = self.fanout.propagate(kind, key) {
                tracing::warn!(kind = %kind, key = %key, error = %e, "fan-out failed");
            }
        }

        let requeue_after = match &result {
            Ok(()) => self.ladder.policy().poll_interval,
            Err((_, e)) if e.requires_operator() => {
                tracing::warn!(kind = %kind, key = %key, error = %e, "needs operator correction");
                self.ladder.policy().poll_interval
            }
            Err((_, e)) => {
                let delay = self.ladder.next_delay(&retry_name);
                tracing::debug!(
                    kind = %kind,
                    key = %key,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "reconcile not converged"
                );
                delay
            }
        };

        Ok(ReconcileOutcome {
            phase,
            ready,
            reason,
            requeue_after: Some(requeue_after),
        })
    }

    /// Decode identity, check the parent, apply. The phase in the error says
    /// how far the pass got.
    fn evaluate(&self, resource: &mut C::Resource) -> Result<(), (ResourcePhase, IpamError)> {
        let name = self
            .codec
            .parse(C::Resource::KIND, &resource.meta().name)
            .map_err(|e| (ResourcePhase::Pending, e))?;
        resource.status_mut().identity = name.identity();

        self.capability
            .check_parent(resource)
            .map_err(|e| (ResourcePhase::Pending, e))?;
        self.capability
            .apply(resource)
            .map_err(|e| (ResourcePhase::Initializing, e))
    }

    fn finalize(
        &self,
        mut resource: C::Resource,
        retry_name: &str,
    ) -> IpamResult<ReconcileOutcome> {
        let kind = C::Resource::KIND;
        let key = resource.key();

        match self.capability.finalize(&resource) {
            Ok(()) => {
                self.store.remove_finalizer(kind, &key, FINALIZER)?;
                self.ladder.forget(retry_name);
                tracing::info!(kind = %kind, key = %key, "finalized");
                if let Err(e) = self.fanout.propagate(kind, &key) {
                    tracing::warn!(kind = %kind, key = %key, error = %e, "fan-out failed");
                }
                Ok(ReconcileOutcome::removed())
            }
            Err(e) => {
                let status = resource.status_mut();
                status.phase = ResourcePhase::Terminating;
                status.condition.set(false, e.reason(), e.to_string());
                self.store.update_status(&resource.into_object())?;

                let delay = self.ladder.next_delay(retry_name);
                tracing::debug!(kind = %kind, key = %key, error = %e, "finalizer blocked");
                Ok(ReconcileOutcome {
                    phase: ResourcePhase::Terminating,
                    ready: false,
                    reason: Some(e.reason()),
                    requeue_after: Some(delay),
                })
            }
        }
    }
}
