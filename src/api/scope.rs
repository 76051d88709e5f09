//! Scope: an independent address-allocation domain owning one prefix index.

use super::meta::{AdminState, ObjectMeta, ResourceStatus};
use crate::core::error::{IpamError, IpamResult};
use crate::index::{AddressFamily, AllocationStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default prefix lengths keyed by purpose, then address family.
pub type PrefixLengthTable = BTreeMap<String, BTreeMap<AddressFamily, u8>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSpec {
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub allocation_strategy: AllocationStrategy,
    #[serde(default)]
    pub default_prefix_length: PrefixLengthTable,
    #[serde(default)]
    pub description: Option<String>,
}

impl ScopeSpec {
    /// Length to allocate for a dynamic claim of the given purpose and family.
    pub fn prefix_length(&self, purpose: &str, family: AddressFamily) -> Option<u8> {
        self.default_prefix_length
            .get(purpose)
            .and_then(|by_family| by_family.get(&family))
            .copied()
    }

    /// Builder-style helper used by bootstrap seeding and tests.
    pub fn with_prefix_length(
        mut self,
        purpose: impl Into<String>,
        family: AddressFamily,
        length: u8,
    ) -> Self {
        self.default_prefix_length
            .entry(purpose.into())
            .or_default()
            .insert(family, length);
        self
    }

    /// Reject lengths that cannot exist in their address family.
    pub fn validate(&self) -> IpamResult<()> {
        for (purpose, by_family) in &self.default_prefix_length {
            for (family, length) in by_family {
                if *length > family.max_prefix_len() {
                    return Err(IpamError::invalid_input(format!(
                        "default prefix length {} for {}/{} exceeds {}",
                        length,
                        purpose,
                        family,
                        family.max_prefix_len()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub meta: ObjectMeta,
    pub spec: ScopeSpec,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl Scope {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: ScopeSpec) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec,
            status: ResourceStatus::default(),
        }
    }
}
