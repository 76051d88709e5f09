//! Object metadata, conditions and scope identity shared by every resource kind.

use crate::reconcile::phase::ResourcePhase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Finalizer placed on every resource the registry manages.
pub const FINALIZER: &str = "ipam.registry/finalizer";

/// The four resource kinds of the registry hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Tenant,
    Scope,
    Pool,
    Claim,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [Self::Tenant, Self::Scope, Self::Pool, Self::Claim];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Scope => "scope",
            Self::Pool => "pool",
            Self::Claim => "claim",
        }
    }

    /// Name of the retry ladder entry for an object of this kind.
    pub fn retry_name(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.as_str(), key)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespaced object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Metadata owned by the object store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    /// Bumped by the store on every spec update.
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Set when deletion was requested while finalizers were still present.
    #[serde(default)]
    pub deletion_requested: bool,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }
}

/// The Ready condition of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub ready: bool,
    /// Stable reason identifier, e.g. `NotReady` or `Ready`.
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// RFC 3339 timestamp of the last readiness flip.
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

impl Condition {
    /// Update the condition, stamping the transition time only when readiness flips.
    pub fn set(&mut self, ready: bool, reason: impl Into<String>, message: impl Into<String>) {
        if self.ready != ready || self.last_transition_time.is_none() {
            self.last_transition_time = Some(chrono::Utc::now().to_rfc3339());
        }
        self.ready = ready;
        self.reason = reason.into();
        self.message = message.into();
    }
}

/// Decoded placement of a resource in the organization / deployment / zone /
/// tenant / scope hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeIdentity {
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub deployment: String,
    #[serde(default)]
    pub availability_zone: String,
    pub tenant: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl ScopeIdentity {
    /// Same organization, deployment, zone and tenant.
    pub fn same_tenant(&self, other: &ScopeIdentity) -> bool {
        self.organization == other.organization
            && self.deployment == other.deployment
            && self.availability_zone == other.availability_zone
            && self.tenant == other.tenant
    }

    /// Same tenant and same scope.
    pub fn same_scope(&self, other: &ScopeIdentity) -> bool {
        self.same_tenant(other) && self.scope.is_some() && self.scope == other.scope
    }
}

/// Observed state common to every kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    #[serde(default)]
    pub phase: ResourcePhase,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub identity: ScopeIdentity,
    /// Generation of the spec this status was computed from.
    #[serde(default)]
    pub observed_generation: u64,
}

impl ResourceStatus {
    pub fn is_ready(&self) -> bool {
        self.condition.ready
    }
}

/// Administrative state of tenants and scopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    #[default]
    Enable,
    Disable,
}

impl AdminState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enable)
    }
}
