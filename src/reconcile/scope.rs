//! Scope capability: owns the scope's prefix index.
//!
//! The index is created the first time the scope reconciles against a ready
//! tenant and dropped only when the scope is finalized. A tenant that goes
//! away or is disabled later turns the scope not ready, which blocks new
//! allocations, but keeps the index so nothing has to be replayed when it
//! comes back.

use super::capability::Capability;
use crate::api::{NameCodec, ResourceKind, Scope, Tenant};
use crate::core::error::{IpamError, IpamResult};
use crate::registry::{ScopeKey, ScopeRegistry};
use crate::store::{fetch, ObjectStore};
use crate::api::meta::ObjectKey;
use std::sync::Arc;

pub struct ScopeCapability {
    store: Arc<dyn ObjectStore>,
    registry: Arc<ScopeRegistry>,
    codec: Arc<dyn NameCodec>,
}

impl ScopeCapability {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<ScopeRegistry>,
        codec: Arc<dyn NameCodec>,
    ) -> Self {
        Self {
            store,
            registry,
            codec,
        }
    }
}

impl Capability for ScopeCapability {
    type Resource = Scope;

    fn check_parent(&self, scope: &Scope) -> IpamResult<()> {
        let parent = self
            .codec
            .parent(ResourceKind::Scope, &scope.meta.name)?
            .ok_or_else(|| IpamError::invalid_input(format!("scope {} has no tenant", scope.meta.name)))?;
        let key = ObjectKey::new(&scope.meta.namespace, parent);
        let tenant: Tenant = fetch(self.store.as_ref(), &key)?
            .ok_or_else(|| IpamError::not_ready(format!("tenant {} not found", key)))?;
        if tenant.meta.deletion_requested {
            return Err(IpamError::not_ready(format!("tenant {} is terminating", key)));
        }
        if !tenant.status.is_ready() {
            return Err(IpamError::not_ready(format!("tenant {} is not ready", key)));
        }
        Ok(())
    }

    fn apply(&self, scope: &mut Scope) -> IpamResult<()> {
        if !scope.spec.admin_state.is_enabled() {
            return Err(IpamError::not_ready("admin disable"));
        }
        scope.spec.validate()?;
        self.registry
            .init(&ScopeKey::new(&scope.meta.namespace, &scope.meta.name));
        Ok(())
    }

    fn finalize(&self, scope: &Scope) -> IpamResult<()> {
        self.registry
            .delete(&ScopeKey::new(&scope.meta.namespace, &scope.meta.name));
        Ok(())
    }
}
