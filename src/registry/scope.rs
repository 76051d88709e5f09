//! Scope registry: one prefix index and retry entry per scope.
//!
//! Two lock levels:
//! - an `RwLock` over the scope map structure (init, delete, lookup);
//! - a `Mutex` per scope over its [`PrefixIndex`], so allocations within one
//!   scope serialize while different scopes proceed independently.
//!
//! Deletion is fenced. The slot is removed from the map and then closed while
//! holding its index lock, so an operation already inside the scope finishes
//! first and anyone still holding the slot afterwards gets NotReady instead of
//! mutating a dropped index.

use super::retry::RetryLadder;
use crate::api::meta::{ObjectKey, ResourceKind};
use crate::core::error::{IpamError, IpamResult};
use crate::index::PrefixIndex;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of a scope: namespace plus the scope object's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    pub namespace: String,
    pub name: String,
}

impl ScopeKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Retry ladder entry owned by the scope.
    pub fn retry_name(&self) -> String {
        ResourceKind::Scope.retry_name(&self.object_key())
    }

    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

struct ScopeSlot {
    /// `None` once the scope was deleted.
    index: Mutex<Option<PrefixIndex>>,
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub scopes: usize,
    pub routes: usize,
}

/// Process-scoped owner of every scope's prefix index.
pub struct ScopeRegistry {
    scopes: RwLock<HashMap<ScopeKey, Arc<ScopeSlot>>>,
    ladder: Arc<RetryLadder>,
}

impl ScopeRegistry {
    pub fn new(ladder: Arc<RetryLadder>) -> Self {
        Self {
            scopes: RwLock::new(HashMap::new()),
            ladder,
        }
    }

    pub fn ladder(&self) -> &Arc<RetryLadder> {
        &self.ladder
    }

    /// Create the index and retry entry for `key` unless they exist.
    ///
    /// Returns true when a new index was created.
    pub fn init(&self, key: &ScopeKey) -> bool {
        self.ladder.track(&key.retry_name());

        let mut scopes = self.scopes.write();
        if scopes.contains_key(key) {
            return false;
        }
        scopes.insert(
            key.clone(),
            Arc::new(ScopeSlot {
                index: Mutex::new(Some(PrefixIndex::new())),
            }),
        );
        tracing::info!(scope = %key, "scope index initialized");
        true
    }

    /// Drop the index and retry entry for `key`.
    ///
    /// Waits for an in-flight operation on the scope to finish. Returns true
    /// when an index was dropped.
    pub fn delete(&self, key: &ScopeKey) -> bool {
        let slot = self.scopes.write().remove(key);
        self.ladder.forget(&key.retry_name());

        let Some(slot) = slot else {
            return false;
        };
        let dropped = slot.index.lock().take();
        if let Some(index) = dropped {
            tracing::info!(scope = %key, routes = index.len(), "scope index dropped");
        }
        true
    }

    pub fn contains(&self, key: &ScopeKey) -> bool {
        self.scopes.read().contains_key(key)
    }

    /// Run `f` against the scope's index while holding the scope lock.
    ///
    /// Fails with NotReady when the scope was never initialized or is being
    /// deleted.
    pub fn with_index<T>(
        &self,
        key: &ScopeKey,
        f: impl FnOnce(&mut PrefixIndex) -> IpamResult<T>,
    ) -> IpamResult<T> {
        let slot = self
            .scopes
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| IpamError::not_ready(format!("scope {} index not initialized", key)))?;

        let mut guard = slot.index.lock();
        let index = guard
            .as_mut()
            .ok_or_else(|| IpamError::not_ready(format!("scope {} is being removed", key)))?;
        f(index)
    }

    pub fn scope_keys(&self) -> Vec<ScopeKey> {
        let mut keys: Vec<ScopeKey> = self.scopes.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> RegistryStats {
        let slots: Vec<Arc<ScopeSlot>> = self.scopes.read().values().cloned().collect();
        let routes = slots
            .iter()
            .map(|slot| slot.index.lock().as_ref().map_or(0, PrefixIndex::len))
            .sum();
        RegistryStats {
            scopes: slots.len(),
            routes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{parse_prefix, Labels, Route};
    use crate::registry::retry::RetryPolicy;

    fn registry() -> ScopeRegistry {
        ScopeRegistry::new(Arc::new(RetryLadder::new(RetryPolicy::default())))
    }

    #[test]
    fn test_init_is_idempotent() {
        let registry = registry();
        let key = ScopeKey::new("default", "ipam.ni1");
        assert!(registry.init(&key));
        registry
            .with_index(&key, |index| {
                index.add(Route::new(parse_prefix("10.0.0.0/24")?, Labels::new()))
            })
            .unwrap();

        assert!(!registry.init(&key));
        assert_eq!(registry.stats().routes, 1);
        assert_eq!(registry.ladder().counter(&key.retry_name()), Some(0));
    }

    #[test]
    fn test_with_index_requires_init() {
        let registry = registry();
        let key = ScopeKey::new("default", "ipam.ni1");
        let err = registry.with_index(&key, |_| Ok(())).unwrap_err();
        assert!(err.is_not_ready());
    }

    #[test]
    fn test_delete_drops_index_and_retry_entry() {
        let registry = registry();
        let key = ScopeKey::new("default", "ipam.ni1");
        registry.init(&key);
        assert!(registry.delete(&key));
        assert!(!registry.contains(&key));
        assert_eq!(registry.ladder().counter(&key.retry_name()), None);
        assert!(!registry.delete(&key));
    }

    #[test]
    fn test_stale_slot_is_fenced() {
        let registry = registry();
        let key = ScopeKey::new("default", "ipam.ni1");
        registry.init(&key);
        let slot = registry.scopes.read().get(&key).cloned().unwrap();
        registry.delete(&key);
        assert!(slot.index.lock().is_none());
    }

    #[test]
    fn test_delete_waits_for_in_flight_operation() {
        let registry = Arc::new(registry());
        let key = ScopeKey::new("default", "ipam.ni1");
        registry.init(&key);

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let worker = {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            std::thread::spawn(move || {
                registry.with_index(&key, |index| {
                    entered_tx.send(()).unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    index.add(Route::new(parse_prefix("10.0.0.0/24")?, Labels::new()))
                })
            })
        };

        entered_rx.recv().unwrap();
        assert!(registry.delete(&key));
        // The in-flight add completed before the index was dropped.
        assert!(worker.join().unwrap().is_ok());
        assert!(registry.with_index(&key, |_| Ok(())).is_err());
    }

    #[test]
    fn test_scopes_are_independent() {
        let registry = registry();
        let a = ScopeKey::new("default", "ipam.ni1");
        let b = ScopeKey::new("default", "ipam.ni2");
        registry.init(&a);
        registry.init(&b);
        registry.delete(&a);
        assert!(registry.with_index(&b, |_| Ok(())).is_ok());
        assert_eq!(registry.scope_keys(), vec![b]);
    }
}
