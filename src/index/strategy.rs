//! Allocation strategies for dynamic claims.

use super::prefix_index::PrefixIndex;
use crate::core::error::IpamResult;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Seed for placement hashing. Changing it moves every deterministic claim.
const PLACEMENT_HASH_SEED: u64 = 0;

/// How a scope picks a free block for a dynamic claim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationStrategy {
    /// Numerically lowest free block.
    #[default]
    FirstAvailable,
    /// Block derived from a stable hash of the claim identity, falling
    /// forward (and wrapping) to the next free block when taken.
    Deterministic,
}

impl AllocationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstAvailable => "first-available",
            Self::Deterministic => "deterministic",
        }
    }

    /// Pick a free `length` block inside `parent` for the claim named `identity`.
    pub fn allocate(
        &self,
        index: &PrefixIndex,
        parent: &IpNet,
        length: u8,
        identity: &str,
    ) -> IpamResult<IpNet> {
        match self {
            Self::FirstAvailable => index.find_free_subnet(parent, length),
            Self::Deterministic => {
                index.find_free_subnet_from(parent, length, placement_seed(identity))
            }
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable hash of a claim identity.
pub fn placement_seed(identity: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(PLACEMENT_HASH_SEED);
    hasher.write(identity.as_bytes());
    hasher.finish()
}
