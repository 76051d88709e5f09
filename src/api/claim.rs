//! Claim: a request for a prefix, explicit or selector-driven.

use super::meta::{ObjectMeta, ResourceStatus};
use crate::index::Labels;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSpec {
    /// Explicit prefix. When absent the claim is dynamic.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Equality constraints, including `purpose` and `address-family` for dynamic claims.
    #[serde(default)]
    pub selector: Labels,
    /// Labels identifying the requester, stamped onto the allocated route.
    #[serde(default)]
    pub source_tag: Labels,
}

impl ClaimSpec {
    pub fn is_dynamic(&self) -> bool {
        self.prefix.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimStatus {
    #[serde(flatten)]
    pub common: ResourceStatus,
    /// Persisted allocation result. Authoritative for release.
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub meta: ObjectMeta,
    pub spec: ClaimSpec,
    #[serde(default)]
    pub status: ClaimStatus,
}

impl Claim {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: ClaimSpec) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec,
            status: ClaimStatus::default(),
        }
    }
}
