//! Hierarchical resource names.
//!
//! Names are dotted paths read right to left. The rightmost segments are fixed
//! by kind (`tenant`, `tenant.scope`, `tenant.scope.resource`); up to three
//! optional leading segments carry organization, deployment and availability
//! zone, in that order:
//!
//! ```text
//! [organization.[deployment.[zone.]]]tenant[.scope[.resource]]
//! ```

use super::meta::{ResourceKind, ScopeIdentity};
use crate::core::error::{IpamError, IpamResult};

/// Maximum number of optional leading segments.
const MAX_PLACEMENT_SEGMENTS: usize = 3;

/// A decoded resource name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceName {
    pub organization: Option<String>,
    pub deployment: Option<String>,
    pub availability_zone: Option<String>,
    pub tenant: String,
    pub scope: Option<String>,
    pub resource: Option<String>,
}

impl ResourceName {
    /// The placement identity used for fan-out filtering.
    pub fn identity(&self) -> ScopeIdentity {
        ScopeIdentity {
            organization: self.organization.clone().unwrap_or_default(),
            deployment: self.deployment.clone().unwrap_or_default(),
            availability_zone: self.availability_zone.clone().unwrap_or_default(),
            tenant: self.tenant.clone(),
            scope: self.scope.clone(),
        }
    }
}

/// Decodes resource names into their place in the hierarchy.
pub trait NameCodec: Send + Sync {
    /// Parse a name of the given kind.
    fn parse(&self, kind: ResourceKind, name: &str) -> IpamResult<ResourceName>;

    /// Inverse of [`NameCodec::parse`].
    fn compose(&self, kind: ResourceKind, name: &ResourceName) -> IpamResult<String>;

    /// Name of the parent resource: the tenant of a scope, the scope of a pool
    /// or claim. Tenants have no parent.
    fn parent(&self, kind: ResourceKind, name: &str) -> IpamResult<Option<String>>;
}

/// `.`-separated names.
#[derive(Debug, Clone, Copy, Default)]
pub struct DottedNameCodec;

impl DottedNameCodec {
    fn depth(kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Tenant => 1,
            ResourceKind::Scope => 2,
            ResourceKind::Pool | ResourceKind::Claim => 3,
        }
    }
}

impl NameCodec for DottedNameCodec {
    fn parse(&self, kind: ResourceKind, name: &str) -> IpamResult<ResourceName> {
        let segments: Vec<&str> = name.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(IpamError::invalid_input(format!(
                "{} name '{}' has an empty segment",
                kind, name
            )));
        }

        let depth = Self::depth(kind);
        if segments.len() < depth || segments.len() > depth + MAX_PLACEMENT_SEGMENTS {
            return Err(IpamError::invalid_input(format!(
                "{} name '{}' must have between {} and {} segments",
                kind,
                name,
                depth,
                depth + MAX_PLACEMENT_SEGMENTS
            )));
        }

        let (lead, own) = segments.split_at(segments.len() - depth);
        let placement = |i: usize| lead.get(i).map(|s| s.to_string());

        Ok(ResourceName {
            organization: placement(0),
            deployment: placement(1),
            availability_zone: placement(2),
            tenant: own[0].to_string(),
            scope: own.get(1).map(|s| s.to_string()),
            resource: own.get(2).map(|s| s.to_string()),
        })
    }

    fn compose(&self, kind: ResourceKind, name: &ResourceName) -> IpamResult<String> {
        let mut segments: Vec<&str> = Vec::with_capacity(6);
        // Placement segments are positional, so a later one cannot appear without its predecessors.
        let placement = [
            name.organization.as_deref(),
            name.deployment.as_deref(),
            name.availability_zone.as_deref(),
        ];
        let mut gap = false;
        for segment in placement {
            match segment {
                Some(s) if gap => {
                    return Err(IpamError::invalid_input(format!(
                        "placement segment '{}' without its predecessors",
                        s
                    )))
                }
                Some(s) => segments.push(s),
                None => gap = true,
            }
        }

        segments.push(&name.tenant);
        let depth = Self::depth(kind);
        if depth >= 2 {
            segments.push(
                name.scope
                    .as_deref()
                    .ok_or_else(|| IpamError::invalid_input(format!("{} name needs a scope", kind)))?,
            );
        }
        if depth >= 3 {
            segments.push(name.resource.as_deref().ok_or_else(|| {
                IpamError::invalid_input(format!("{} name needs a resource segment", kind))
            })?);
        }
        Ok(segments.join("."))
    }

    fn parent(&self, kind: ResourceKind, name: &str) -> IpamResult<Option<String>> {
        self.parse(kind, name)?;
        if kind == ResourceKind::Tenant {
            return Ok(None);
        }
        Ok(name.rsplit_once('.').map(|(parent, _)| parent.to_string()))
    }
}
