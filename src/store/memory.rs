//! In-memory object store.

use super::{Change, ObjectStore, WatchEvent};
use crate::api::meta::{ObjectKey, ResourceKind};
use crate::api::object::Object;
use crate::core::error::{IpamError, IpamResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Capacity of the change stream before slow watchers start lagging.
const WATCH_CAPACITY: usize = 1024;

type StoreKey = (ResourceKind, ObjectKey);

/// Process-local object store with a broadcast change stream.
pub struct MemoryStore {
    objects: RwLock<BTreeMap<StoreKey, Object>>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn emit(&self, kind: ResourceKind, key: ObjectKey, change: Change) {
        // No receivers is fine.
        let _ = self.events.send(WatchEvent { kind, key, change });
    }

    fn not_found(kind: ResourceKind, key: &ObjectKey) -> IpamError {
        IpamError::not_found(format!("{} {}", kind, key))
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, kind: ResourceKind, key: &ObjectKey) -> IpamResult<Option<Object>> {
        Ok(self.objects.read().get(&(kind, key.clone())).cloned())
    }

    fn list(&self, kind: ResourceKind, namespace: Option<&str>) -> IpamResult<Vec<Object>> {
        Ok(self
            .objects
            .read()
            .iter()
            .filter(|((k, key), _)| *k == kind && namespace.map_or(true, |ns| key.namespace == ns))
            .map(|(_, object)| object.clone())
            .collect())
    }

    fn create(&self, mut object: Object) -> IpamResult<Object> {
        let kind = object.kind();
        let key = object.key();
        {
            let mut objects = self.objects.write();
            if objects.contains_key(&(kind, key.clone())) {
                return Err(IpamError::conflict(format!("{} {}", kind, key)));
            }
            let meta = object.meta_mut();
            meta.generation = 1;
            meta.deletion_requested = false;
            objects.insert((kind, key.clone()), object.clone());
        }
        self.emit(kind, key, Change::Created);
        Ok(object)
    }

    fn update(&self, object: Object) -> IpamResult<Object> {
        let kind = object.kind();
        let key = object.key();
        let (updated, changed) = {
            let mut objects = self.objects.write();
            let stored = objects
                .get_mut(&(kind, key.clone()))
                .ok_or_else(|| Self::not_found(kind, &key))?;
            let changed = stored.spec_differs(&object);
            if changed {
                stored.copy_spec_from(&object);
                stored.meta_mut().generation += 1;
            }
            (stored.clone(), changed)
        };
        if changed {
            self.emit(kind, key, Change::SpecUpdated);
        }
        Ok(updated)
    }

    fn update_status(&self, object: &Object) -> IpamResult<()> {
        let kind = object.kind();
        let key = object.key();
        {
            let mut objects = self.objects.write();
            let stored = objects
                .get_mut(&(kind, key.clone()))
                .ok_or_else(|| Self::not_found(kind, &key))?;
            if !stored.copy_status_from(object) {
                return Err(IpamError::store(format!("{} {} has the wrong kind", kind, key)));
            }
        }
        self.emit(kind, key, Change::StatusUpdated);
        Ok(())
    }

    fn delete(&self, kind: ResourceKind, key: &ObjectKey) -> IpamResult<()> {
        let change = {
            let mut objects = self.objects.write();
            let store_key = (kind, key.clone());
            let stored = objects
                .get_mut(&store_key)
                .ok_or_else(|| Self::not_found(kind, key))?;
            if stored.meta().finalizers.is_empty() {
                objects.remove(&store_key);
                Change::Deleted
            } else if stored.meta().deletion_requested {
                return Ok(());
            } else {
                stored.meta_mut().deletion_requested = true;
                Change::DeletionRequested
            }
        };
        self.emit(kind, key.clone(), change);
        Ok(())
    }

    fn add_finalizer(&self, kind: ResourceKind, key: &ObjectKey, finalizer: &str) -> IpamResult<()> {
        let mut objects = self.objects.write();
        let stored = objects
            .get_mut(&(kind, key.clone()))
            .ok_or_else(|| Self::not_found(kind, key))?;
        let meta = stored.meta_mut();
        if !meta.has_finalizer(finalizer) {
            meta.finalizers.push(finalizer.to_string());
        }
        Ok(())
    }

    fn remove_finalizer(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
        finalizer: &str,
    ) -> IpamResult<()> {
        let removed = {
            let mut objects = self.objects.write();
            let store_key = (kind, key.clone());
            let stored = objects
                .get_mut(&store_key)
                .ok_or_else(|| Self::not_found(kind, key))?;
            let meta = stored.meta_mut();
            meta.finalizers.retain(|f| f != finalizer);
            if meta.deletion_requested && meta.finalizers.is_empty() {
                objects.remove(&store_key);
                true
            } else {
                false
            }
        };
        if removed {
            self.emit(kind, key.clone(), Change::Deleted);
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::meta::FINALIZER;
    use crate::api::tenant::{Tenant, TenantSpec};
    use crate::api::AdminState;

    fn tenant(name: &str) -> Object {
        Tenant::new("default", name, TenantSpec::default()).into()
    }

    #[test]
    fn test_create_conflict() {
        let store = MemoryStore::new();
        store.create(tenant("ipam")).unwrap();
        assert!(store.create(tenant("ipam")).unwrap_err().is_conflict());
    }

    #[test]
    fn test_update_bumps_generation_only_on_spec_change() {
        let store = MemoryStore::new();
        let created = store.create(tenant("ipam")).unwrap();
        assert_eq!(created.meta().generation, 1);

        let same = store.update(tenant("ipam")).unwrap();
        assert_eq!(same.meta().generation, 1);

        let mut disabled = Tenant::new("default", "ipam", TenantSpec::default());
        disabled.spec.admin_state = AdminState::Disable;
        let updated = store.update(disabled.into()).unwrap();
        assert_eq!(updated.meta().generation, 2);
    }

    #[test]
    fn test_delete_waits_for_finalizer() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("default", "ipam");
        store.create(tenant("ipam")).unwrap();
        store
            .add_finalizer(ResourceKind::Tenant, &key, FINALIZER)
            .unwrap();

        store.delete(ResourceKind::Tenant, &key).unwrap();
        let pending = store.get(ResourceKind::Tenant, &key).unwrap().unwrap();
        assert!(pending.meta().deletion_requested);

        store
            .remove_finalizer(ResourceKind::Tenant, &key, FINALIZER)
            .unwrap();
        assert!(store.get(ResourceKind::Tenant, &key).unwrap().is_none());
    }

    #[test]
    fn test_list_filters_namespace_and_kind() {
        let store = MemoryStore::new();
        store.create(tenant("a")).unwrap();
        store
            .create(Tenant::new("other", "b", TenantSpec::default()).into())
            .unwrap();
        assert_eq!(store.list(ResourceKind::Tenant, None).unwrap().len(), 2);
        assert_eq!(
            store
                .list(ResourceKind::Tenant, Some("default"))
                .unwrap()
                .len(),
            1
        );
        assert!(store.list(ResourceKind::Scope, None).unwrap().is_empty());
    }

    #[test]
    fn test_watch_reports_changes() {
        let store = MemoryStore::new();
        let mut rx = store.watch();
        let created = store.create(tenant("ipam")).unwrap();
        store.update_status(&created).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.change, Change::Created);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.change, Change::StatusUpdated);
        assert!(!second.change.is_spec_change());
    }
}
