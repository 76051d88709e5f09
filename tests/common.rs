//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use ipam_registry::api::{
    Claim, ClaimSpec, Object, ObjectKey, Pool, PoolSpec, ResourceKind, Scope, ScopeSpec, Tenant,
    TenantSpec,
};
use ipam_registry::config::ReconcileConfig;
use ipam_registry::index::{AddressFamily, Labels, ADDRESS_FAMILY_LABEL, PURPOSE_LABEL};
use ipam_registry::reconcile::Controller;
use ipam_registry::store::{MemoryStore, ObjectStore};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const NS: &str = "default";
pub const TENANT: &str = "acme";
pub const SCOPE: &str = "acme.core";
pub const POOL: &str = "acme.core.loopbacks";

/// Build a label map from pairs.
pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Selector for a loopback claim of the given family.
pub fn loopback_selector(family: AddressFamily) -> Labels {
    labels(&[(PURPOSE_LABEL, "loopback"), (ADDRESS_FAMILY_LABEL, family.as_str())])
}

/// Scope spec with /32 and /128 loopbacks.
pub fn loopback_scope_spec() -> ScopeSpec {
    ScopeSpec::default()
        .with_prefix_length("loopback", AddressFamily::Ipv4, 32)
        .with_prefix_length("loopback", AddressFamily::Ipv6, 128)
}

pub fn pool_spec(prefix: &str, purpose: &str) -> PoolSpec {
    PoolSpec {
        prefix: prefix.to_string(),
        pool: true,
        labels: labels(&[(PURPOSE_LABEL, purpose)]),
        description: None,
    }
}

pub fn dynamic_claim(name: &str, family: AddressFamily) -> Claim {
    Claim::new(
        NS,
        name,
        ClaimSpec {
            prefix: None,
            selector: loopback_selector(family),
            source_tag: labels(&[("claim", name)]),
        },
    )
}

pub fn explicit_claim(name: &str, prefix: &str) -> Claim {
    Claim::new(
        NS,
        name,
        ClaimSpec {
            prefix: Some(prefix.to_string()),
            selector: loopback_selector(AddressFamily::Ipv4),
            source_tag: labels(&[("claim", name)]),
        },
    )
}

pub fn create(store: &MemoryStore, object: impl Into<Object>) {
    store.create(object.into()).expect("create object");
}

/// Tenant, scope and a 10.0.0.0/24 loopback pool.
pub fn seed_hierarchy(store: &MemoryStore) {
    create(store, Tenant::new(NS, TENANT, TenantSpec::default()));
    create(store, Scope::new(NS, SCOPE, loopback_scope_spec()));
    create(store, Pool::new(NS, POOL, pool_spec("10.0.0.0/24", "loopback")));
}

/// Store plus a controller over it.
pub fn controller() -> (Arc<MemoryStore>, Arc<Controller>) {
    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn ObjectStore> = store.clone();
    let controller = Arc::new(Controller::new(shared, ReconcileConfig::default()));
    (store, controller)
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NS, name)
}

/// Persisted prefix on a claim's status.
pub fn claim_prefix(store: &MemoryStore, name: &str) -> Option<String> {
    match store.get(ResourceKind::Claim, &key(name)).expect("get claim") {
        Some(Object::Claim(claim)) => claim.status.prefix,
        _ => None,
    }
}

pub fn is_ready(store: &MemoryStore, kind: ResourceKind, name: &str) -> bool {
    store
        .get(kind, &key(name))
        .expect("get object")
        .map(|object| object.status().is_ready())
        .unwrap_or(false)
}

/// Write a config file.
pub fn create_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// A config seeding the standard hierarchy and one dynamic claim.
pub fn create_bootstrap_config() -> NamedTempFile {
    create_config(
        r#"
[reconcile]
poll_interval_seconds = 2
short_wait_seconds = 1
very_short_wait_seconds = 1

[telemetry]
log_level = "debug"

[bootstrap]
namespace = "default"

[[bootstrap.tenants]]
name = "acme"

[[bootstrap.scopes]]
name = "acme.core"
allocation_strategy = "first-available"

[bootstrap.scopes.default_prefix_length.loopback]
ipv4 = 32

[[bootstrap.pools]]
name = "acme.core.loopbacks"
prefix = "10.0.0.0/24"
pool = true
labels = { purpose = "loopback" }

[[bootstrap.claims]]
name = "acme.core.router1"
selector = { purpose = "loopback", "address-family" = "ipv4" }
source_tag = { claim = "router1" }
"#,
    )
}
