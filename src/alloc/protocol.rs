//! Register, DeRegister and Declare against a scope's prefix index.
//!
//! Every operation first re-validates the parent scope through the object
//! store and then works on the scope index under its lock. All operations are
//! idempotent: a Conflict on insert and a NotFound on delete are success.

use crate::api::{NameCodec, Pool, ResourceKind, Scope};
use crate::core::error::{tolerate_conflict, tolerate_not_found, IpamError, IpamResult};
use crate::index::{
    parse_prefix, pick_unique, AddressFamily, LabelSelector, Labels, PrefixIndex, Route,
    ADDRESS_FAMILY_LABEL, PURPOSE_LABEL,
};
use crate::registry::{ScopeKey, ScopeRegistry};
use crate::store::{fetch, ObjectStore};
use ipnet::IpNet;
use std::sync::Arc;

/// Label naming the owning claim on routes of claims without a source tag.
pub const CLAIM_LABEL: &str = "ipam.registry/claim";

/// The claim's source tag, or one naming the claim when it carries none.
///
/// Routes are found again by their full label set, so two claims must never
/// end up with the same one.
pub fn source_tag_or_default(source_tag: &Labels, claim: &str) -> Labels {
    if !source_tag.is_empty() {
        return source_tag.clone();
    }
    let mut tag = Labels::new();
    tag.insert(CLAIM_LABEL.to_string(), claim.to_string());
    tag
}

/// Labels a pool declaration is indexed with: its own plus the derived
/// `address-family`.
pub fn pool_labels(labels: &Labels, prefix: &IpNet) -> Labels {
    let mut labels = labels.clone();
    labels.insert(
        ADDRESS_FAMILY_LABEL.to_string(),
        AddressFamily::of(prefix).to_string(),
    );
    labels
}

/// Everything Register and DeRegister need to know about a claim.
#[derive(Debug, Clone, Default)]
pub struct RegisterInfo {
    pub namespace: String,
    /// Name of the scope object the claim belongs to.
    pub scope: String,
    /// Claim identity, used for deterministic placement.
    pub claim: String,
    /// Explicit prefix. `None` for dynamic claims.
    pub prefix: Option<String>,
    pub selector: LabelSelector,
    pub source_tag: Labels,
    /// Prefix previously persisted on the claim's status.
    pub persisted: Option<String>,
}

impl RegisterInfo {
    pub fn scope_key(&self) -> ScopeKey {
        ScopeKey::new(&self.namespace, &self.scope)
    }

    /// The selector's `purpose` value.
    pub fn purpose(&self) -> IpamResult<&str> {
        self.selector.get(PURPOSE_LABEL).ok_or_else(|| {
            IpamError::invalid_input(format!("selector {} has no {} key", self.selector, PURPOSE_LABEL))
        })
    }

    /// The selector's `address-family` value.
    pub fn address_family(&self) -> IpamResult<AddressFamily> {
        self.selector
            .get(ADDRESS_FAMILY_LABEL)
            .ok_or_else(|| {
                IpamError::invalid_input(format!(
                    "selector {} has no {} key",
                    self.selector, ADDRESS_FAMILY_LABEL
                ))
            })?
            .parse()
    }

    /// Selector plus source tag.
    pub fn combined(&self) -> LabelSelector {
        self.selector.merged(&self.source_tag)
    }
}

/// Allocation protocol over the scope registry.
pub struct Allocator {
    store: Arc<dyn ObjectStore>,
    registry: Arc<ScopeRegistry>,
    codec: Arc<dyn NameCodec>,
}

impl Allocator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<ScopeRegistry>,
        codec: Arc<dyn NameCodec>,
    ) -> Self {
        Self {
            store,
            registry,
            codec,
        }
    }

    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    /// Fetch the scope object and require it to be ready with an initialized index.
    pub fn ready_scope(&self, key: &ScopeKey) -> IpamResult<Scope> {
        self.codec.parse(ResourceKind::Scope, &key.name)?;
        let scope: Scope = fetch(self.store.as_ref(), &key.object_key())?
            .ok_or_else(|| IpamError::not_ready(format!("scope {} not found", key)))?;
        if !scope.status.is_ready() {
            return Err(IpamError::not_ready(format!("scope {} is not ready", key)));
        }
        if !self.registry.contains(key) {
            return Err(IpamError::not_ready(format!(
                "scope {} index not initialized",
                key
            )));
        }
        Ok(scope)
    }

    /// Create or find the claim's prefix and return it in canonical form.
    pub fn register(&self, info: &RegisterInfo) -> IpamResult<IpNet> {
        let key = info.scope_key();
        let scope = self.ready_scope(&key)?;
        let combined = info.combined();

        if let Some(ref raw) = info.prefix {
            let prefix = parse_prefix(raw)?;
            let labels = combined.into_labels();
            return self.registry.with_index(&key, |index| {
                tolerate_conflict(index.add(Route::new(prefix, labels)))?;
                tracing::debug!(scope = %key, prefix = %prefix, "explicit prefix registered");
                Ok(prefix)
            });
        }

        let purpose = info.purpose()?.to_string();
        let family = info.address_family()?;
        let persisted = info.persisted.as_deref().map(parse_prefix).transpose()?;

        self.registry.with_index(&key, |index| {
            let matches = index.query_by_labels(&info.selector);
            if matches.is_empty() {
                return Err(IpamError::no_available_route(&info.selector));
            }
            let length = scope.spec.prefix_length(&purpose, family).ok_or_else(|| {
                IpamError::missing_configuration(format!(
                    "scope {} has no default prefix length for {}/{}",
                    key, purpose, family
                ))
            })?;

            // Already allocated: a block of the claim's length carrying exactly its labels.
            let existing: Vec<&Route> = owned_routes(index, &combined)
                .into_iter()
                .filter(|route| route.prefix().prefix_len() == length)
                .collect();
            if let Some(route) = pick_unique(&existing, &combined) {
                return Ok(route.prefix());
            }

            let pools = candidate_pools(&matches, length);
            if pools.is_empty() {
                return Err(IpamError::no_available_route(&info.selector));
            }

            let prefix = match persisted.filter(|p| {
                p.prefix_len() == length && pools.iter().any(|pool| index.is_free_within(pool, p))
            }) {
                Some(restored) => restored,
                None => allocate_from(index, &pools, length, &scope, info)?,
            };

            index.add(Route::new(prefix, combined.into_labels()))?;
            tracing::debug!(scope = %key, prefix = %prefix, claim = %info.claim, "prefix allocated");
            Ok(prefix)
        })
    }

    /// Release the claim's persisted prefix. A missing route is success.
    pub fn deregister(&self, info: &RegisterInfo) -> IpamResult<()> {
        let key = info.scope_key();
        self.ready_scope(&key)?;
        let Some(ref raw) = info.persisted else {
            return Ok(());
        };
        let prefix = parse_prefix(raw)?;
        self.registry.with_index(&key, |index| {
            tolerate_not_found(index.delete(&prefix).map(|_| ()))?;
            tracing::debug!(scope = %key, prefix = %prefix, "prefix released");
            Ok(())
        })
    }

    /// Find an already-allocated prefix for the claim by its combined labels.
    pub fn lookup(&self, info: &RegisterInfo) -> IpamResult<Option<IpNet>> {
        let key = info.scope_key();
        let combined = info.combined();
        self.registry.with_index(&key, |index| {
            let matches = owned_routes(index, &combined);
            Ok(pick_unique(&matches, &combined).map(Route::prefix))
        })
    }

    /// Insert a pool declaration into its scope index and stamp the derived
    /// `address-family` label onto the pool's observed labels.
    pub fn declare(&self, key: &ScopeKey, pool: &mut Pool) -> IpamResult<IpNet> {
        let prefix = parse_prefix(&pool.spec.prefix)?;
        let labels = pool_labels(&pool.spec.labels, &prefix);
        pool.status.labels = labels.clone();

        self.registry.with_index(key, |index| {
            tolerate_conflict(index.add(Route::new(prefix, labels)))?;
            Ok(prefix)
        })
    }

    /// Remove a pool declaration from its scope index.
    ///
    /// A missing route or an already dropped index is success.
    pub fn retract(&self, key: &ScopeKey, prefix: &str) -> IpamResult<()> {
        let prefix = parse_prefix(prefix)?;
        if !self.registry.contains(key) {
            return Ok(());
        }
        match self
            .registry
            .with_index(key, |index| tolerate_not_found(index.delete(&prefix).map(|_| ())))
        {
            Err(e) if e.is_not_ready() => Ok(()),
            other => other,
        }
    }

    /// Children and parents of a declared prefix.
    pub fn usage(&self, key: &ScopeKey, prefix: &IpNet) -> IpamResult<PrefixUsage> {
        self.registry.with_index(key, |index| {
            let strings = |routes: Vec<&Route>| -> Vec<String> {
                routes.iter().map(|r| r.prefix().to_string()).collect()
            };
            Ok(PrefixUsage {
                children: strings(index.children(prefix)),
                parents: strings(index.parents(prefix)),
            })
        })
    }
}

/// Routes whose label set is exactly `combined`.
///
/// A plain selector match is not ownership: pool declarations and claims with
/// a wider tag also satisfy the requirements.
fn owned_routes<'a>(index: &'a PrefixIndex, combined: &LabelSelector) -> Vec<&'a Route> {
    index
        .query_by_labels(combined)
        .into_iter()
        .filter(|route| route.labels() == combined.requirements())
        .collect()
}

/// Occupancy of a declared prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixUsage {
    pub children: Vec<String>,
    pub parents: Vec<String>,
}

/// Selector matches that can hold a `length` block, in lexicographic prefix
/// order. Allocated claims match the selector too, but are never wider than
/// the requested length and so drop out.
fn candidate_pools(matches: &[&Route], length: u8) -> Vec<IpNet> {
    let mut pools: Vec<IpNet> = matches
        .iter()
        .map(|route| route.prefix())
        .filter(|p| p.prefix_len() < length)
        .collect();
    pools.sort_by_key(|p| p.to_string());
    pools
}

/// Try each candidate pool in turn; exhaustion of all of them is reported
/// against the last one.
fn allocate_from(
    index: &PrefixIndex,
    pools: &[IpNet],
    length: u8,
    scope: &Scope,
    info: &RegisterInfo,
) -> IpamResult<IpNet> {
    let identity = format!("{}/{}", info.namespace, info.claim);
    let mut last = None;
    for pool in pools {
        match scope
            .spec
            .allocation_strategy
            .allocate(index, pool, length, &identity)
        {
            Ok(prefix) => return Ok(prefix),
            Err(e @ IpamError::AddressSpaceExhausted { .. }) => last = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or_else(|| IpamError::no_available_route(&info.selector)))
}
