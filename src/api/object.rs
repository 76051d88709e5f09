//! Tagged union over the four resource kinds.
//!
//! The object store holds [`Object`] values; capabilities work on the typed
//! resources and convert through the [`Resource`] trait.

use super::claim::Claim;
use super::meta::{ObjectKey, ObjectMeta, ResourceKind, ResourceStatus};
use super::pool::Pool;
use super::scope::Scope;
use super::tenant::Tenant;
use serde::{Deserialize, Serialize};

/// Typed access shared by every resource kind.
pub trait Resource: Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    fn status(&self) -> &ResourceStatus;
    fn status_mut(&mut self) -> &mut ResourceStatus;
    fn into_object(self) -> Object;
    fn from_object(object: Object) -> Option<Self>;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

/// A stored resource of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Object {
    Tenant(Tenant),
    Scope(Scope),
    Pool(Pool),
    Claim(Claim),
}

impl Object {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Tenant(_) => ResourceKind::Tenant,
            Self::Scope(_) => ResourceKind::Scope,
            Self::Pool(_) => ResourceKind::Pool,
            Self::Claim(_) => ResourceKind::Claim,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Tenant(r) => &r.meta,
            Self::Scope(r) => &r.meta,
            Self::Pool(r) => &r.meta,
            Self::Claim(r) => &r.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Tenant(r) => &mut r.meta,
            Self::Scope(r) => &mut r.meta,
            Self::Pool(r) => &mut r.meta,
            Self::Claim(r) => &mut r.meta,
        }
    }

    pub fn status(&self) -> &ResourceStatus {
        match self {
            Self::Tenant(r) => &r.status,
            Self::Scope(r) => &r.status,
            Self::Pool(r) => &r.status.common,
            Self::Claim(r) => &r.status.common,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    /// Replace the spec with `other`'s, leaving metadata and status alone.
    ///
    /// Returns false when the kinds differ.
    pub fn copy_spec_from(&mut self, other: &Object) -> bool {
        match (self, other) {
            (Self::Tenant(a), Self::Tenant(b)) => a.spec = b.spec.clone(),
            (Self::Scope(a), Self::Scope(b)) => a.spec = b.spec.clone(),
            (Self::Pool(a), Self::Pool(b)) => a.spec = b.spec.clone(),
            (Self::Claim(a), Self::Claim(b)) => a.spec = b.spec.clone(),
            _ => return false,
        }
        true
    }

    /// Replace the status with `other`'s, leaving metadata and spec alone.
    ///
    /// Returns false when the kinds differ.
    pub fn copy_status_from(&mut self, other: &Object) -> bool {
        match (self, other) {
            (Self::Tenant(a), Self::Tenant(b)) => a.status = b.status.clone(),
            (Self::Scope(a), Self::Scope(b)) => a.status = b.status.clone(),
            (Self::Pool(a), Self::Pool(b)) => a.status = b.status.clone(),
            (Self::Claim(a), Self::Claim(b)) => a.status = b.status.clone(),
            _ => return false,
        }
        true
    }

    /// Whether the specs differ (same kind assumed).
    pub fn spec_differs(&self, other: &Object) -> bool {
        match (self, other) {
            (Self::Tenant(a), Self::Tenant(b)) => a.spec != b.spec,
            (Self::Scope(a), Self::Scope(b)) => a.spec != b.spec,
            (Self::Pool(a), Self::Pool(b)) => a.spec != b.spec,
            (Self::Claim(a), Self::Claim(b)) => a.spec != b.spec,
            _ => true,
        }
    }
}

macro_rules! impl_resource {
    ($ty:ident, $kind:ident, $($status:ident).+) => {
        impl Resource for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;

            fn meta(&self) -> &ObjectMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.meta
            }

            fn status(&self) -> &ResourceStatus {
                &self.$($status).+
            }

            fn status_mut(&mut self) -> &mut ResourceStatus {
                &mut self.$($status).+
            }

            fn into_object(self) -> Object {
                Object::$kind(self)
            }

            fn from_object(object: Object) -> Option<Self> {
                match object {
                    Object::$kind(r) => Some(r),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Object {
            fn from(resource: $ty) -> Self {
                Object::$kind(resource)
            }
        }
    };
}

impl_resource!(Tenant, Tenant, status);
impl_resource!(Scope, Scope, status);
impl_resource!(Pool, Pool, status.common);
impl_resource!(Claim, Claim, status.common);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::claim::ClaimSpec;
    use crate::api::tenant::TenantSpec;

    #[test]
    fn test_round_trip_through_object() {
        let tenant = Tenant::new("default", "ipam", TenantSpec::default());
        let object: Object = tenant.clone().into();
        assert_eq!(object.kind(), ResourceKind::Tenant);
        assert_eq!(Tenant::from_object(object), Some(tenant));
    }

    #[test]
    fn test_from_object_rejects_other_kind() {
        let claim = Claim::new("default", "ipam.ni1.c1", ClaimSpec::default());
        assert!(Tenant::from_object(claim.into_object()).is_none());
    }

    #[test]
    fn test_copy_status_keeps_spec() {
        let mut stored = Claim::new("default", "ipam.ni1.c1", ClaimSpec::default()).into_object();
        let mut update = Claim::new(
            "default",
            "ipam.ni1.c1",
            ClaimSpec {
                prefix: Some("10.0.0.9/32".to_string()),
                ..Default::default()
            },
        );
        update.status.prefix = Some("10.0.0.9/32".to_string());

        assert!(stored.copy_status_from(&update.into_object()));
        let claim = Claim::from_object(stored).unwrap();
        assert_eq!(claim.status.prefix.as_deref(), Some("10.0.0.9/32"));
        assert!(claim.spec.prefix.is_none());
    }
}
