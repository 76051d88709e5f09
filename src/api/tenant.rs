//! Tenant: root of the hierarchy. A scope is only initialized under a ready tenant.

use super::meta::{AdminState, ObjectMeta, ResourceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSpec {
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub meta: ObjectMeta,
    pub spec: TenantSpec,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl Tenant {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: TenantSpec) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec,
            status: ResourceStatus::default(),
        }
    }
}
