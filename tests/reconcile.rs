//! Reconciliation hierarchy tests.

mod common;

use common::*;
use ipam_registry::api::{
    AdminState, Claim, Object, ObjectKey, Pool, ResourceKind, Scope, Tenant, TenantSpec,
};
use ipam_registry::config::ReconcileConfig;
use ipam_registry::index::AddressFamily;
use ipam_registry::reconcile::{Controller, ResourcePhase};
use ipam_registry::registry::ScopeKey;
use ipam_registry::error::IpamResult;
use ipam_registry::store::{MemoryStore, ObjectStore, WatchEvent};
use ipnet::IpNet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

fn scope_key() -> ScopeKey {
    ScopeKey::new(NS, SCOPE)
}

fn indexed(controller: &Controller, prefix: &str) -> bool {
    let prefix: IpNet = prefix.parse().unwrap();
    controller
        .registry()
        .with_index(&scope_key(), |index| Ok(index.get(&prefix).is_some()))
        .unwrap()
}

fn pool(store: &MemoryStore, name: &str) -> Pool {
    match store.get(ResourceKind::Pool, &key(name)).unwrap() {
        Some(Object::Pool(pool)) => pool,
        other => panic!("expected pool, got {:?}", other),
    }
}

fn claim(store: &MemoryStore, name: &str) -> Claim {
    match store.get(ResourceKind::Claim, &key(name)).unwrap() {
        Some(Object::Claim(claim)) => claim,
        other => panic!("expected claim, got {:?}", other),
    }
}

// ============================================================================
// Convergence
// ============================================================================

#[test]
fn hierarchy_converges_and_allocates() {
    let (store, controller) = controller();
    seed_hierarchy(&store);
    create(&store, dynamic_claim("acme.core.router1", AddressFamily::Ipv4));
    create(&store, dynamic_claim("acme.core.router2", AddressFamily::Ipv4));

    controller.converge(5).unwrap();

    for (kind, name) in [
        (ResourceKind::Tenant, TENANT),
        (ResourceKind::Scope, SCOPE),
        (ResourceKind::Pool, POOL),
        (ResourceKind::Claim, "acme.core.router1"),
        (ResourceKind::Claim, "acme.core.router2"),
    ] {
        assert!(is_ready(&store, kind, name), "{} {} not ready", kind, name);
    }

    let first = claim_prefix(&store, "acme.core.router1").unwrap();
    let second = claim_prefix(&store, "acme.core.router2").unwrap();
    assert_ne!(first, second);
    assert!(indexed(&controller, &first));

    let pool = pool(&store, POOL);
    assert_eq!(pool.status.common.phase, ResourcePhase::Ready);
    assert_eq!(pool.status.labels.get("address-family").map(String::as_str), Some("ipv4"));
    assert_eq!(pool.status.allocated, 2);
    assert!(pool.status.children.contains(&first));

    let claim = claim(&store, "acme.core.router1");
    assert_eq!(claim.status.common.identity.tenant, TENANT);
    assert_eq!(claim.status.common.identity.scope.as_deref(), Some("core"));
    assert_eq!(claim.status.common.observed_generation, 1);
    assert!(claim.meta.has_finalizer(ipam_registry::api::FINALIZER));
}

#[test]
fn reconcile_is_stable_once_converged() {
    let (store, controller) = controller();
    seed_hierarchy(&store);
    create(&store, dynamic_claim("acme.core.router1", AddressFamily::Ipv4));
    controller.converge(5).unwrap();
    let before = claim_prefix(&store, "acme.core.router1");

    let mut events = store.watch();
    let outcome = controller
        .reconcile_once(ResourceKind::Claim, &key("acme.core.router1"))
        .unwrap();
    assert!(outcome.ready);
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(60)));
    assert_eq!(claim_prefix(&store, "acme.core.router1"), before);
    // Nothing changed, so nothing was written.
    assert!(events.try_recv().is_err());
}

#[test]
fn claim_under_unready_scope_backs_off() {
    // Scope without a tenant: never becomes ready.
    let (store, controller) = controller();
    create(&store, Scope::new(NS, SCOPE, loopback_scope_spec()));
    create(&store, explicit_claim("acme.core.router1", "10.0.0.5/32"));

    let claim_key = key("acme.core.router1");
    let delays: Vec<_> = (0..5)
        .map(|_| {
            let outcome = controller
                .reconcile_once(ResourceKind::Claim, &claim_key)
                .unwrap();
            assert!(!outcome.ready);
            assert_eq!(outcome.phase, ResourcePhase::Pending);
            assert_eq!(outcome.reason, Some("NotReady"));
            outcome.requeue_after.unwrap().as_secs()
        })
        .collect();
    assert_eq!(delays, vec![1, 5, 5, 60, 60]);

    let claim = claim(&store, "acme.core.router1");
    assert_eq!(claim.status.common.condition.reason, "NotReady");
    assert_eq!(claim.status.prefix, None);
}

#[test]
fn tenant_arrival_fans_out_to_scopes() {
    let (store, controller) = controller();
    create(&store, Scope::new(NS, SCOPE, loopback_scope_spec()));
    create(&store, Scope::new(NS, "other.core", loopback_scope_spec()));
    controller
        .reconcile_once(ResourceKind::Scope, &key(SCOPE))
        .unwrap();
    let ladder_name = ResourceKind::Scope.retry_name(&key(SCOPE));
    assert_eq!(controller.ladder().counter(&ladder_name), Some(1));

    create(&store, Tenant::new(NS, TENANT, TenantSpec::default()));
    let outcome = controller
        .reconcile_once(ResourceKind::Tenant, &key(TENANT))
        .unwrap();
    assert!(outcome.ready);

    // Only the scope of this tenant was reset and queued.
    assert_eq!(controller.ladder().counter(&ladder_name), Some(0));
    assert_eq!(controller.queues().scopes.len(), 1);
}

#[test]
fn disabled_tenant_blocks_scope_but_keeps_index() {
    let (store, controller) = controller();
    seed_hierarchy(&store);
    create(&store, explicit_claim("acme.core.router1", "10.0.0.5/32"));
    controller.converge(5).unwrap();
    assert!(indexed(&controller, "10.0.0.5/32"));

    let mut tenant = Tenant::new(NS, TENANT, TenantSpec::default());
    tenant.spec.admin_state = AdminState::Disable;
    let updated = store.update(tenant.into()).unwrap();
    assert_eq!(updated.meta().generation, 2);

    let outcome = controller
        .reconcile_once(ResourceKind::Tenant, &key(TENANT))
        .unwrap();
    assert!(!outcome.ready);
    assert_eq!(outcome.phase, ResourcePhase::Initializing);

    let outcome = controller
        .reconcile_once(ResourceKind::Scope, &key(SCOPE))
        .unwrap();
    assert!(!outcome.ready);
    assert_eq!(outcome.phase, ResourcePhase::Pending);

    // The index survives; new work on it is refused.
    assert!(controller.registry().contains(&scope_key()));
    assert!(indexed(&controller, "10.0.0.5/32"));
    let outcome = controller
        .reconcile_once(ResourceKind::Claim, &key("acme.core.router1"))
        .unwrap();
    assert_eq!(outcome.reason, Some("NotReady"));
}

#[test]
fn edited_explicit_prefix_releases_old_one() {
    let (store, controller) = controller();
    seed_hierarchy(&store);
    create(&store, explicit_claim("acme.core.router1", "10.0.0.5/32"));
    controller.converge(5).unwrap();
    assert_eq!(claim_prefix(&store, "acme.core.router1").as_deref(), Some("10.0.0.5/32"));

    // Push the pool up the ladder so the fan-out reset is observable.
    let pool_ladder = ResourceKind::Pool.retry_name(&key(POOL));
    controller.ladder().next_delay(&pool_ladder);
    assert_eq!(controller.ladder().counter(&pool_ladder), Some(1));

    store
        .update(explicit_claim("acme.core.router1", "10.0.0.6/32").into())
        .unwrap();
    controller
        .reconcile_once(ResourceKind::Claim, &key("acme.core.router1"))
        .unwrap();

    assert_eq!(claim_prefix(&store, "acme.core.router1").as_deref(), Some("10.0.0.6/32"));
    assert!(!indexed(&controller, "10.0.0.5/32"));
    assert!(indexed(&controller, "10.0.0.6/32"));
    // The prefix change reset and re-queued the scope's pools.
    assert_eq!(controller.ladder().counter(&pool_ladder), Some(0));
    assert_eq!(controller.queues().pools.len(), 1);
}

#[test]
fn edited_pool_replaces_its_declaration() {
    let (store, controller) = controller();
    seed_hierarchy(&store);
    controller.converge(5).unwrap();
    assert_eq!(pool(&store, POOL).status.declared.as_deref(), Some("10.0.0.0/24"));

    store
        .update(Pool::new(NS, POOL, pool_spec("10.1.0.0/24", "isl")).into())
        .unwrap();
    controller
        .reconcile_once(ResourceKind::Pool, &key(POOL))
        .unwrap();
    assert!(!indexed(&controller, "10.0.0.0/24"));
    assert!(indexed(&controller, "10.1.0.0/24"));
    assert_eq!(pool(&store, POOL).status.declared.as_deref(), Some("10.1.0.0/24"));
    assert_eq!(controller.registry().stats().routes, 1);

    // Same prefix, new labels: the route is re-inserted with them.
    store
        .update(Pool::new(NS, POOL, pool_spec("10.1.0.0/24", "loopback")).into())
        .unwrap();
    controller
        .reconcile_once(ResourceKind::Pool, &key(POOL))
        .unwrap();
    let declared: IpNet = "10.1.0.0/24".parse().unwrap();
    let purpose = controller
        .registry()
        .with_index(&scope_key(), |index| {
            Ok(index
                .get(&declared)
                .and_then(|route| route.labels().get("purpose").cloned()))
        })
        .unwrap();
    assert_eq!(purpose.as_deref(), Some("loopback"));
    assert_eq!(
        pool(&store, POOL).status.labels.get("purpose").map(String::as_str),
        Some("loopback")
    );

    // Finalizing retracts the current declaration.
    store.delete(ResourceKind::Pool, &key(POOL)).unwrap();
    controller
        .reconcile_once(ResourceKind::Pool, &key(POOL))
        .unwrap();
    assert!(!indexed(&controller, "10.1.0.0/24"));
    assert_eq!(controller.registry().stats().routes, 0);
}

#[test]
fn invalid_claim_name_stays_pending() {
    let (store, controller) = controller();
    seed_hierarchy(&store);
    create(&store, dynamic_claim("router-without-scope", AddressFamily::Ipv4));

    let outcome = controller
        .reconcile_once(ResourceKind::Claim, &key("router-without-scope"))
        .unwrap();
    assert_eq!(outcome.phase, ResourcePhase::Pending);
    assert_eq!(outcome.reason, Some("InvalidInput"));
}

#[test]
fn exhausted_pool_waits_for_poll_interval() {
    let (store, controller) = controller();
    create(&store, Tenant::new(NS, TENANT, TenantSpec::default()));
    create(&store, Scope::new(NS, SCOPE, loopback_scope_spec()));
    create(&store, Pool::new(NS, POOL, pool_spec("10.0.0.0/32", "loopback")));
    controller.converge(5).unwrap();

    // A /32 pool has no room for a /32 claim.
    create(&store, dynamic_claim("acme.core.router1", AddressFamily::Ipv4));
    let outcome = controller
        .reconcile_once(ResourceKind::Claim, &key("acme.core.router1"))
        .unwrap();
    assert_eq!(outcome.reason, Some("NoAvailableRoute"));

    let (store, controller) = common::controller();
    create(&store, Tenant::new(NS, TENANT, TenantSpec::default()));
    create(&store, Scope::new(NS, SCOPE, loopback_scope_spec()));
    create(&store, Pool::new(NS, POOL, pool_spec("10.0.0.0/31", "loopback")));
    create(&store, explicit_claim("acme.core.a", "10.0.0.0/32"));
    create(&store, explicit_claim("acme.core.b", "10.0.0.1/32"));
    controller.converge(5).unwrap();

    create(&store, dynamic_claim("acme.core.router1", AddressFamily::Ipv4));
    let outcome = controller
        .reconcile_once(ResourceKind::Claim, &key("acme.core.router1"))
        .unwrap();
    assert_eq!(outcome.reason, Some("AddressSpaceExhausted"));
    assert_eq!(outcome.phase, ResourcePhase::Initializing);
    assert_eq!(outcome.requeue_after, Some(Duration::from_secs(60)));
}

// ============================================================================
// Finalizers
// ============================================================================

#[test]
fn deleting_claim_releases_prefix() {
    let (store, controller) = controller();
    seed_hierarchy(&store);
    create(&store, dynamic_claim("acme.core.router1", AddressFamily::Ipv4));
    controller.converge(5).unwrap();
    let prefix = claim_prefix(&store, "acme.core.router1").unwrap();

    let claim_key = key("acme.core.router1");
    store.delete(ResourceKind::Claim, &claim_key).unwrap();
    // Held back by the finalizer.
    assert!(store.get(ResourceKind::Claim, &claim_key).unwrap().is_some());

    let outcome = controller
        .reconcile_once(ResourceKind::Claim, &claim_key)
        .unwrap();
    assert_eq!(outcome.phase, ResourcePhase::Removed);
    assert_eq!(outcome.requeue_after, None);
    assert!(store.get(ResourceKind::Claim, &claim_key).unwrap().is_none());
    assert!(!indexed(&controller, &prefix));
}

#[test]
fn deleting_scope_drops_index_and_unblocks_claims() {
    let (store, controller) = controller();
    seed_hierarchy(&store);
    create(&store, dynamic_claim("acme.core.router1", AddressFamily::Ipv4));
    controller.converge(5).unwrap();

    store.delete(ResourceKind::Scope, &key(SCOPE)).unwrap();
    let outcome = controller
        .reconcile_once(ResourceKind::Scope, &key(SCOPE))
        .unwrap();
    assert_eq!(outcome.phase, ResourcePhase::Removed);
    assert!(!controller.registry().contains(&scope_key()));

    // Dependents lose their parent.
    let outcome = controller
        .reconcile_once(ResourceKind::Claim, &key("acme.core.router1"))
        .unwrap();
    assert_eq!(outcome.phase, ResourcePhase::Pending);
    assert!(!is_ready(&store, ResourceKind::Claim, "acme.core.router1"));

    // With the scope gone there is nothing to release.
    store
        .delete(ResourceKind::Claim, &key("acme.core.router1"))
        .unwrap();
    store.delete(ResourceKind::Pool, &key(POOL)).unwrap();
    controller
        .reconcile_once(ResourceKind::Claim, &key("acme.core.router1"))
        .unwrap();
    controller
        .reconcile_once(ResourceKind::Pool, &key(POOL))
        .unwrap();
    assert!(store
        .list(ResourceKind::Claim, Some(NS))
        .unwrap()
        .is_empty());
    assert!(store.list(ResourceKind::Pool, Some(NS)).unwrap().is_empty());
}

#[test]
fn deleting_pool_retracts_declaration() {
    let (store, controller) = controller();
    seed_hierarchy(&store);
    controller.converge(5).unwrap();
    assert!(indexed(&controller, "10.0.0.0/24"));

    store.delete(ResourceKind::Pool, &key(POOL)).unwrap();
    controller
        .reconcile_once(ResourceKind::Pool, &key(POOL))
        .unwrap();
    assert!(!indexed(&controller, "10.0.0.0/24"));
}

#[test]
fn converge_reports_stats() {
    let (store, controller) = controller();
    seed_hierarchy(&store);
    create(&store, dynamic_claim("acme.core.router1", AddressFamily::Ipv4));
    controller.converge(5).unwrap();

    let stats = controller.stats();
    assert_eq!(stats.registry.scopes, 1);
    assert_eq!(stats.registry.routes, 2);
    assert_eq!(stats.ladder.saturated, 0);
}

// ============================================================================
// Controller loop
// ============================================================================

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn controller_run_converges_from_watch_events() {
    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn ObjectStore> = store.clone();
    let config = ReconcileConfig {
        concurrency: 2,
        ..ReconcileConfig::default()
    };
    let controller = Arc::new(Controller::new(shared, config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&controller).run(shutdown_rx));

    // Created while the controller is already running, children first.
    create(&store, dynamic_claim("acme.core.router1", AddressFamily::Ipv4));
    create(&store, Pool::new(NS, POOL, pool_spec("10.0.0.0/24", "loopback")));
    create(&store, Scope::new(NS, SCOPE, loopback_scope_spec()));
    create(&store, Tenant::new(NS, TENANT, TenantSpec::default()));

    let converged = wait_for(|| claim_prefix(&store, "acme.core.router1").is_some()).await;
    assert!(converged, "claim was never allocated");

    // Deletion goes through the finalizer.
    let claim_key = ObjectKey::new(NS, "acme.core.router1");
    store.delete(ResourceKind::Claim, &claim_key).unwrap();
    let removed = wait_for(|| {
        store
            .get(ResourceKind::Claim, &claim_key)
            .map(|o| o.is_none())
            .unwrap_or(false)
    })
    .await;
    assert!(removed, "claim was never finalized");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
    assert!(controller.queues().claims.is_shut_down());
}

/// Store whose claim reads block, recording how many overlap.
struct StallingStore {
    inner: MemoryStore,
    stall: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    reads: AtomicUsize,
}

impl StallingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            stall: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }
}

impl ObjectStore for StallingStore {
    fn get(&self, kind: ResourceKind, key: &ObjectKey) -> IpamResult<Option<Object>> {
        if kind == ResourceKind::Claim && self.stall.load(Ordering::SeqCst) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.reads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2500));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.get(kind, key)
    }

    fn list(&self, kind: ResourceKind, namespace: Option<&str>) -> IpamResult<Vec<Object>> {
        self.inner.list(kind, namespace)
    }

    fn create(&self, object: Object) -> IpamResult<Object> {
        self.inner.create(object)
    }

    fn update(&self, object: Object) -> IpamResult<Object> {
        self.inner.update(object)
    }

    fn update_status(&self, object: &Object) -> IpamResult<()> {
        self.inner.update_status(object)
    }

    fn delete(&self, kind: ResourceKind, key: &ObjectKey) -> IpamResult<()> {
        self.inner.delete(kind, key)
    }

    fn add_finalizer(&self, kind: ResourceKind, key: &ObjectKey, finalizer: &str) -> IpamResult<()> {
        self.inner.add_finalizer(kind, key, finalizer)
    }

    fn remove_finalizer(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
        finalizer: &str,
    ) -> IpamResult<()> {
        self.inner.remove_finalizer(kind, key, finalizer)
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.watch()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_reconcile_keeps_key_until_it_returns() {
    let store = Arc::new(StallingStore::new());
    store
        .create(dynamic_claim("acme.core.router1", AddressFamily::Ipv4).into())
        .unwrap();

    let shared: Arc<dyn ObjectStore> = store.clone();
    let config = ReconcileConfig {
        concurrency: 2,
        reconcile_timeout_seconds: 1,
        very_short_wait_seconds: 1,
        short_wait_seconds: 1,
        ..ReconcileConfig::default()
    };
    let controller = Arc::new(Controller::new(shared, config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&controller).run(shutdown_rx));

    // Each pass outlives the 1s timeout; the retry lands 1s after the
    // abandoned pass returns, not 1s after it was abandoned.
    let retried = wait_for(|| store.reads.load(Ordering::SeqCst) >= 2).await;
    assert!(retried, "claim was never retried");
    assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);

    store.stall.store(false, Ordering::SeqCst);
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}
