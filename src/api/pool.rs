//! Pool: a statically declared prefix belonging to a scope.

use super::meta::{ObjectMeta, ResourceStatus};
use crate::index::Labels;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// Declared CIDR, e.g. `10.0.0.0/24`.
    pub prefix: String,
    /// Whether dynamic claims may carve children out of this block.
    #[serde(default)]
    pub pool: bool,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    #[serde(flatten)]
    pub common: ResourceStatus,
    /// Prefix currently declared in the scope index.
    #[serde(default)]
    pub declared: Option<String>,
    /// Declared labels plus the derived `address-family` label.
    #[serde(default)]
    pub labels: Labels,
    /// Prefixes currently indexed inside this declaration.
    #[serde(default)]
    pub children: Vec<String>,
    /// Declarations that contain this one.
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub allocated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub meta: ObjectMeta,
    pub spec: PoolSpec,
    #[serde(default)]
    pub status: PoolStatus,
}

impl Pool {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: PoolSpec) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec,
            status: PoolStatus::default(),
        }
    }
}
