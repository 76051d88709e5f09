//! Tenant capability. Tenants are the root of the hierarchy.

use super::capability::Capability;
use crate::api::Tenant;
use crate::core::error::{IpamError, IpamResult};

#[derive(Debug, Default)]
pub struct TenantCapability;

impl Capability for TenantCapability {
    type Resource = Tenant;

    fn check_parent(&self, _tenant: &Tenant) -> IpamResult<()> {
        Ok(())
    }

    fn apply(&self, tenant: &mut Tenant) -> IpamResult<()> {
        if !tenant.spec.admin_state.is_enabled() {
            return Err(IpamError::not_ready("admin disable"));
        }
        Ok(())
    }

    fn finalize(&self, _tenant: &Tenant) -> IpamResult<()> {
        Ok(())
    }
}
