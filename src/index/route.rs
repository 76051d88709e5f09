//! Routes, labels and label selectors.

use crate::core::error::{IpamError, IpamResult};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Label set attached to a route.
pub type Labels = BTreeMap<String, String>;

/// Label carrying the derived address family of a route.
pub const ADDRESS_FAMILY_LABEL: &str = "address-family";

/// Label carrying the purpose a dynamic claim allocates for.
pub const PURPOSE_LABEL: &str = "purpose";

/// IP address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn of(prefix: &IpNet) -> Self {
        match prefix {
            IpNet::V4(_) => Self::Ipv4,
            IpNet::V6(_) => Self::Ipv6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        }
    }

    pub fn max_prefix_len(&self) -> u8 {
        match self {
            Self::Ipv4 => 32,
            Self::Ipv6 => 128,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressFamily {
    type Err = IpamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            other => Err(IpamError::invalid_input(format!(
                "unknown address family '{}'",
                other
            ))),
        }
    }
}

/// Parse a CIDR string and canonicalize it to its network address.
pub fn parse_prefix(raw: &str) -> IpamResult<IpNet> {
    raw.trim()
        .parse::<IpNet>()
        .map(|net| net.trunc())
        .map_err(|e| IpamError::invalid_input(format!("invalid prefix '{}': {}", raw, e)))
}

/// An index record pairing a prefix with its labels.
///
/// Immutable once inserted; a change is a delete followed by a re-insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    prefix: IpNet,
    labels: Labels,
}

impl Route {
    pub fn new(prefix: IpNet, labels: Labels) -> Self {
        Self {
            prefix: prefix.trunc(),
            labels,
        }
    }

    pub fn prefix(&self) -> IpNet {
        self.prefix
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn address_family(&self) -> AddressFamily {
        AddressFamily::of(&self.prefix)
    }
}

/// AND of key/value equality requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Labels,
}

impl LabelSelector {
    pub fn new(requirements: Labels) -> Self {
        Self { requirements }
    }

    /// True when every requirement is present in `labels` with the same value.
    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }

    /// Union of both requirement sets. `other` wins on a key clash.
    pub fn merged(&self, other: &Labels) -> Self {
        let mut requirements = self.requirements.clone();
        requirements.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { requirements }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.requirements.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &Labels {
        &self.requirements
    }

    pub fn into_labels(self) -> Labels {
        self.requirements
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        f.write_str("{")?;
        for (k, v) in &self.requirements {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
            first = false;
        }
        f.write_str("}")
    }
}
