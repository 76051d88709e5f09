//! Claim capability: registers the claim and persists the result.

use super::capability::Capability;
use crate::alloc::{source_tag_or_default, Allocator, RegisterInfo};
use crate::api::{Claim, NameCodec, ResourceKind};
use crate::core::error::{IpamError, IpamResult};
use crate::index::{parse_prefix, LabelSelector};
use std::sync::Arc;

pub struct ClaimCapability {
    allocator: Arc<Allocator>,
    codec: Arc<dyn NameCodec>,
}

impl ClaimCapability {
    pub fn new(allocator: Arc<Allocator>, codec: Arc<dyn NameCodec>) -> Self {
        Self { allocator, codec }
    }

    /// Register/DeRegister input for a claim, carrying its persisted prefix.
    pub fn register_info(&self, claim: &Claim) -> IpamResult<RegisterInfo> {
        let scope = self
            .codec
            .parent(ResourceKind::Claim, &claim.meta.name)?
            .ok_or_else(|| IpamError::invalid_input(format!("claim {} has no scope", claim.meta.name)))?;
        Ok(RegisterInfo {
            namespace: claim.meta.namespace.clone(),
            scope,
            claim: claim.meta.name.clone(),
            prefix: claim.spec.prefix.clone(),
            selector: LabelSelector::new(claim.spec.selector.clone()),
            source_tag: source_tag_or_default(&claim.spec.source_tag, &claim.meta.name),
            persisted: claim.status.prefix.clone(),
        })
    }
}

impl Capability for ClaimCapability {
    type Resource = Claim;

    fn check_parent(&self, claim: &Claim) -> IpamResult<()> {
        let info = self.register_info(claim)?;
        self.allocator.ready_scope(&info.scope_key()).map(|_| ())
    }

    fn apply(&self, claim: &mut Claim) -> IpamResult<()> {
        let info = self.register_info(claim)?;
        if claim.spec.is_dynamic() {
            info.purpose()?;
            info.address_family()?;
        }

        // An edited explicit prefix releases the one persisted earlier.
        if let (Some(desired), Some(persisted)) = (&info.prefix, &info.persisted) {
            if parse_prefix(desired)? != parse_prefix(persisted)? {
                self.allocator.deregister(&info)?;
                claim.status.prefix = None;
            }
        }

        let prefix = self.allocator.register(&info)?;
        claim.status.prefix = Some(prefix.to_string());
        Ok(())
    }

    fn finalize(&self, claim: &Claim) -> IpamResult<()> {
        let info = self.register_info(claim)?;
        match self.allocator.deregister(&info) {
            // Nothing can be held in a scope that was never initialized or is gone.
            Err(e) if e.is_not_ready() && !self.allocator.registry().contains(&info.scope_key()) => {
                Ok(())
            }
            other => other,
        }
    }

    fn observed_changed(&self, before: &Claim, after: &Claim) -> bool {
        before.status.prefix != after.status.prefix
    }
}
