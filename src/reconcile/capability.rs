//! Per-kind operations driven by the generic reconciler.

use crate::api::object::Resource;
use crate::core::error::IpamResult;

/// What a resource kind contributes to reconciliation.
///
/// The driver owns everything common to all kinds (finalizers, status
/// conditions, phases, retry scheduling, fan-out); a capability only states
/// what "parent ready", "applied" and "cleaned up" mean for its kind.
pub trait Capability: Send + Sync + 'static {
    type Resource: Resource;

    /// Fails with NotReady when the parent is missing or not ready.
    fn check_parent(&self, resource: &Self::Resource) -> IpamResult<()>;

    /// Apply the local effect and fill in kind-specific status.
    fn apply(&self, resource: &mut Self::Resource) -> IpamResult<()>;

    /// Undo the local effect before the object is removed.
    fn finalize(&self, resource: &Self::Resource) -> IpamResult<()>;

    /// Whether the kind-specific observed state changed in a way dependents
    /// must see. Readiness flips are detected by the driver.
    fn observed_changed(&self, _before: &Self::Resource, _after: &Self::Resource) -> bool {
        false
    }
}
