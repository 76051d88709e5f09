//! Per-scope prefix allocation engine.
//!
//! - [`route`] - Routes, labels and selectors
//! - [`prefix_index`] - Prefix index and free-subnet search
//! - [`strategy`] - First-available and deterministic placement

pub mod prefix_index;
pub mod route;
pub mod strategy;

pub use prefix_index::{IndexStats, PrefixIndex};
pub use route::{
    parse_prefix, AddressFamily, LabelSelector, Labels, Route, ADDRESS_FAMILY_LABEL,
    PURPOSE_LABEL,
};
pub use strategy::{placement_seed, AllocationStrategy};

/// Pick one route out of several that were expected to be unique.
///
/// More than one match is a data inconsistency: it is logged and the route
/// with the lexicographically smallest prefix string wins.
pub fn pick_unique<'a>(matches: &[&'a Route], selector: &LabelSelector) -> Option<&'a Route> {
    if matches.len() > 1 {
        tracing::warn!(
            selector = %selector,
            matches = matches.len(),
            "label query expected a unique route"
        );
    }
    matches
        .iter()
        .copied()
        .min_by_key(|route| route.prefix().to_string())
}
