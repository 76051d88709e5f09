//! Pool capability: declares the pool's prefix in its scope index and
//! reports what is allocated inside it.

use super::capability::Capability;
use crate::alloc::{pool_labels, Allocator};
use crate::api::{NameCodec, Pool, ResourceKind};
use crate::core::error::{IpamError, IpamResult};
use crate::index::parse_prefix;
use crate::registry::ScopeKey;
use std::sync::Arc;

pub struct PoolCapability {
    allocator: Arc<Allocator>,
    codec: Arc<dyn NameCodec>,
}

impl PoolCapability {
    pub fn new(allocator: Arc<Allocator>, codec: Arc<dyn NameCodec>) -> Self {
        Self { allocator, codec }
    }

    fn scope_key(&self, pool: &Pool) -> IpamResult<ScopeKey> {
        let scope = self
            .codec
            .parent(ResourceKind::Pool, &pool.meta.name)?
            .ok_or_else(|| IpamError::invalid_input(format!("pool {} has no scope", pool.meta.name)))?;
        Ok(ScopeKey::new(&pool.meta.namespace, scope))
    }
}

impl Capability for PoolCapability {
    type Resource = Pool;

    fn check_parent(&self, pool: &Pool) -> IpamResult<()> {
        self.allocator.ready_scope(&self.scope_key(pool)?).map(|_| ())
    }

    fn apply(&self, pool: &mut Pool) -> IpamResult<()> {
        let key = self.scope_key(pool)?;

        // Routes are immutable: an edited prefix or label set replaces the
        // declaration made earlier.
        if let Some(declared) = pool.status.declared.clone() {
            let desired = parse_prefix(&pool.spec.prefix)?;
            if parse_prefix(&declared)? != desired
                || pool.status.labels != pool_labels(&pool.spec.labels, &desired)
            {
                self.allocator.retract(&key, &declared)?;
                pool.status.declared = None;
                tracing::info!(pool = %pool.meta.key(), old = %declared, new = %desired, "pool declaration replaced");
            }
        }

        let prefix = self.allocator.declare(&key, pool)?;
        pool.status.declared = Some(prefix.to_string());
        let usage = self.allocator.usage(&key, &prefix)?;
        pool.status.allocated = usage.children.len();
        pool.status.children = usage.children;
        pool.status.parents = usage.parents;
        Ok(())
    }

    fn finalize(&self, pool: &Pool) -> IpamResult<()> {
        let key = self.scope_key(pool)?;
        let declared = pool.status.declared.as_deref().unwrap_or(&pool.spec.prefix);
        self.allocator.retract(&key, declared)
    }
}
