//! Dependency fan-out.
//!
//! When a resource changes, every resource of a dependent kind in the same
//! tenant or scope gets its retry ladder reset and is queued again:
//!
//! | changed | re-evaluated             | match on        |
//! |---------|--------------------------|-----------------|
//! | tenant  | scopes                   | tenant identity |
//! | scope   | pools, claims            | scope identity  |
//! | claim   | pools                    | scope identity  |
//!
//! Dependents are found by listing the namespace and filtering on the decoded
//! names, which is O(N) per event.

use super::queue::WorkQueue;
use crate::api::meta::{ObjectKey, ResourceKind, ScopeIdentity};
use crate::api::NameCodec;
use crate::core::error::IpamResult;
use crate::registry::RetryLadder;
use crate::store::ObjectStore;
use std::sync::Arc;

/// One work queue per kind.
#[derive(Default)]
pub struct Queues {
    pub tenants: Arc<WorkQueue>,
    pub scopes: Arc<WorkQueue>,
    pub pools: Arc<WorkQueue>,
    pub claims: Arc<WorkQueue>,
}

impl Queues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ResourceKind) -> &Arc<WorkQueue> {
        match kind {
            ResourceKind::Tenant => &self.tenants,
            ResourceKind::Scope => &self.scopes,
            ResourceKind::Pool => &self.pools,
            ResourceKind::Claim => &self.claims,
        }
    }

    pub fn shutdown(&self) {
        for kind in ResourceKind::ALL {
            self.get(kind).shutdown();
        }
    }
}

/// Kinds that must be re-evaluated when a resource of `kind` changes.
pub fn dependents(kind: ResourceKind) -> &'static [ResourceKind] {
    match kind {
        ResourceKind::Tenant => &[ResourceKind::Scope],
        ResourceKind::Scope => &[ResourceKind::Pool, ResourceKind::Claim],
        ResourceKind::Claim => &[ResourceKind::Pool],
        ResourceKind::Pool => &[],
    }
}

/// Resets and re-queues dependents of a changed resource.
pub struct FanOut {
    store: Arc<dyn ObjectStore>,
    ladder: Arc<RetryLadder>,
    codec: Arc<dyn NameCodec>,
    queues: Arc<Queues>,
}

impl FanOut {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ladder: Arc<RetryLadder>,
        codec: Arc<dyn NameCodec>,
        queues: Arc<Queues>,
    ) -> Self {
        Self {
            store,
            ladder,
            codec,
            queues,
        }
    }

    /// Propagate a change of the object `key` of `kind`.
    ///
    /// Returns the number of dependents queued.
    pub fn propagate(&self, kind: ResourceKind, key: &ObjectKey) -> IpamResult<usize> {
        let source = self.codec.parse(kind, &key.name)?.identity();
        self.propagate_identity(kind, &key.namespace, &source)
    }

    /// Propagate a change at `source` in `namespace`.
    pub fn propagate_identity(
        &self,
        kind: ResourceKind,
        namespace: &str,
        source: &ScopeIdentity,
    ) -> IpamResult<usize> {
        let mut queued = 0;
        for &dependent in dependents(kind) {
            for object in self.store.list(dependent, Some(namespace))? {
                let key = object.key();
                let Ok(name) = self.codec.parse(dependent, &key.name) else {
                    continue;
                };
                let identity = name.identity();
                let matches = match kind {
                    ResourceKind::Tenant => source.same_tenant(&identity),
                    _ => source.same_scope(&identity),
                };
                if !matches {
                    continue;
                }
                self.ladder.reset(&dependent.retry_name(&key));
                self.queues.get(dependent).add(key);
                queued += 1;
            }
        }
        if queued > 0 {
            tracing::debug!(kind = %kind, namespace, queued, "dependents re-queued");
        }
        Ok(queued)
    }
}
