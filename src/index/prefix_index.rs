//! Per-scope label-augmented prefix index.
//!
//! The index is a flat map from canonical prefix to [`Route`]. Parent/child
//! relationships are never stored; they are derived on demand from CIDR
//! containment.
//!
//! # Free-subnet search
//!
//! Addresses are mapped onto `u128` offsets. The routes strictly inside the
//! parent block ("blockers") are sorted by start address and walked once with
//! a cursor aligned to the requested block size, so the search is linear in
//! the number of routes regardless of how many candidate blocks the parent
//! holds.

use super::route::{LabelSelector, Route};
use crate::core::error::{IpamError, IpamResult};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Index statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub routes: usize,
    pub ipv4: usize,
    pub ipv6: usize,
}

/// Label-augmented set of allocated prefixes for one scope.
#[derive(Debug, Default)]
pub struct PrefixIndex {
    routes: BTreeMap<IpNet, Route>,
}

impl PrefixIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route. Fails with Conflict if the exact prefix is present.
    pub fn add(&mut self, route: Route) -> IpamResult<()> {
        let prefix = route.prefix();
        if self.routes.contains_key(&prefix) {
            return Err(IpamError::conflict(format!("route {}", prefix)));
        }
        self.routes.insert(prefix, route);
        Ok(())
    }

    /// Remove a route by exact prefix. Fails with NotFound if absent.
    pub fn delete(&mut self, prefix: &IpNet) -> IpamResult<Route> {
        self.routes
            .remove(&prefix.trunc())
            .ok_or_else(|| IpamError::not_found(format!("route {}", prefix)))
    }

    pub fn get(&self, prefix: &IpNet) -> Option<&Route> {
        self.routes.get(&prefix.trunc())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// All routes whose labels satisfy `selector`.
    pub fn query_by_labels(&self, selector: &LabelSelector) -> Vec<&Route> {
        self.routes
            .values()
            .filter(|route| selector.matches(route.labels()))
            .collect()
    }

    /// Routes strictly contained in `prefix`.
    pub fn children(&self, prefix: &IpNet) -> Vec<&Route> {
        let prefix = prefix.trunc();
        self.routes
            .values()
            .filter(|route| route.prefix() != prefix && prefix.contains(&route.prefix()))
            .collect()
    }

    /// Routes strictly containing `prefix`.
    pub fn parents(&self, prefix: &IpNet) -> Vec<&Route> {
        let prefix = prefix.trunc();
        self.routes
            .values()
            .filter(|route| route.prefix() != prefix && route.prefix().contains(&prefix))
            .collect()
    }

    /// Lowest-addressed free `length` block inside `parent`.
    ///
    /// A block is free when it neither overlaps, contains nor is contained by
    /// any route other than `parent` and its ancestors.
    pub fn find_free_subnet(&self, parent: &IpNet, length: u8) -> IpamResult<IpNet> {
        let search = FreeSearch::new(self, parent, length)?;
        search
            .scan(search.start)
            .map(|offset| search.block_at(offset))
            .unwrap_or_else(|| Err(IpamError::exhausted(search.parent, length)))
    }

    /// Like [`PrefixIndex::find_free_subnet`], but starts at block
    /// `seed mod capacity` and wraps around to the start of `parent`.
    pub fn find_free_subnet_from(&self, parent: &IpNet, length: u8, seed: u64) -> IpamResult<IpNet> {
        let search = FreeSearch::new(self, parent, length)?;
        let blocks = 1u128.checked_shl(u32::from(length - search.parent.prefix_len()));
        let slot = match blocks {
            Some(blocks) => u128::from(seed) % blocks,
            None => u128::from(seed),
        };
        let from = slot
            .checked_mul(search.size)
            .and_then(|offset| search.start.checked_add(offset))
            .unwrap_or(search.start);

        search
            .scan(from)
            .or_else(|| search.scan(search.start))
            .map(|offset| search.block_at(offset))
            .unwrap_or_else(|| Err(IpamError::exhausted(search.parent, length)))
    }

    /// Whether `candidate` could be inserted inside `parent` without overlapping
    /// anything but `parent` and its ancestors.
    pub fn is_free_within(&self, parent: &IpNet, candidate: &IpNet) -> bool {
        let parent = parent.trunc();
        let candidate = candidate.trunc();
        if candidate == parent || !parent.contains(&candidate) {
            return false;
        }
        let (start, end) = bounds(&candidate);
        blockers(self, &parent)
            .iter()
            .all(|&(b_start, b_end)| b_end < start || b_start > end)
    }

    pub fn stats(&self) -> IndexStats {
        let ipv4 = self
            .routes
            .keys()
            .filter(|p| matches!(p, IpNet::V4(_)))
            .count();
        IndexStats {
            routes: self.routes.len(),
            ipv4,
            ipv6: self.routes.len() - ipv4,
        }
    }
}

/// State for one free-subnet search.
struct FreeSearch {
    parent: IpNet,
    length: u8,
    /// First address of the parent.
    start: u128,
    /// Last address of the parent.
    end: u128,
    /// Block size in addresses.
    size: u128,
    /// Sorted `(start, end)` ranges of routes strictly inside the parent.
    blockers: Vec<(u128, u128)>,
}

impl FreeSearch {
    fn new(index: &PrefixIndex, parent: &IpNet, length: u8) -> IpamResult<Self> {
        let parent = parent.trunc();
        // An equal-length block would collide with the parent route itself.
        if length <= parent.prefix_len() || length > parent.max_prefix_len() {
            return Err(IpamError::invalid_input(format!(
                "cannot carve a /{} out of {}",
                length, parent
            )));
        }
        let (start, end) = bounds(&parent);
        let size = 1u128 << u32::from(parent.max_prefix_len() - length);
        Ok(Self {
            parent,
            length,
            start,
            end,
            size,
            blockers: blockers(index, &parent),
        })
    }

    /// Lowest aligned free block at or after `from`.
    fn scan(&self, from: u128) -> Option<u128> {
        let mut cursor = align_up(from, self.size)?;
        for &(b_start, b_end) in &self.blockers {
            if b_end < cursor {
                continue;
            }
            if cursor.checked_add(self.size - 1)? < b_start {
                break;
            }
            cursor = align_up(b_end.checked_add(1)?, self.size)?;
        }
        (cursor.checked_add(self.size - 1)? <= self.end).then_some(cursor)
    }

    fn block_at(&self, offset: u128) -> IpamResult<IpNet> {
        let net = match self.parent {
            IpNet::V4(_) => {
                let addr = u32::try_from(offset).map_err(|_| {
                    IpamError::invalid_input(format!("offset {} outside ipv4 space", offset))
                })?;
                Ipv4Net::new(Ipv4Addr::from(addr), self.length).map(IpNet::V4)
            }
            IpNet::V6(_) => Ipv6Net::new(Ipv6Addr::from(offset), self.length).map(IpNet::V6),
        };
        net.map_err(|e| IpamError::invalid_input(e.to_string()))
    }
}

/// First and last address of a prefix as integers.
fn bounds(net: &IpNet) -> (u128, u128) {
    match net {
        IpNet::V4(n) => (
            u128::from(u32::from(n.network())),
            u128::from(u32::from(n.broadcast())),
        ),
        IpNet::V6(n) => (u128::from(n.network()), u128::from(n.broadcast())),
    }
}

/// Ranges of the routes strictly inside `parent`, sorted by start.
fn blockers(index: &PrefixIndex, parent: &IpNet) -> Vec<(u128, u128)> {
    let mut ranges: Vec<(u128, u128)> = index
        .routes
        .keys()
        .filter(|prefix| *prefix != parent && parent.contains(*prefix))
        .map(bounds)
        .collect();
    ranges.sort_unstable();
    ranges
}

fn align_up(value: u128, size: u128) -> Option<u128> {
    match value % size {
        0 => Some(value),
        rem => value.checked_add(size - rem),
    }
}
