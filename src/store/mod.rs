//! Declarative object store interface.
//!
//! The registry consumes the store through [`ObjectStore`]: namespaced reads,
//! spec and status writes, finalizer-deferred deletion and a change stream.
//! [`memory::MemoryStore`] is the in-process implementation.

pub mod memory;

use crate::api::meta::{ObjectKey, ResourceKind};
use crate::api::object::{Object, Resource};
use crate::core::error::{IpamError, IpamResult};
use tokio::sync::broadcast;

pub use memory::MemoryStore;

/// What happened to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    /// Spec replaced; generation bumped.
    SpecUpdated,
    /// Only status changed.
    StatusUpdated,
    /// Deletion requested while finalizers are still present.
    DeletionRequested,
    /// Object physically removed.
    Deleted,
}

impl Change {
    /// Whether dependents should be re-evaluated. Status-only writes are
    /// excluded so that reconcilers do not trigger themselves.
    pub fn is_spec_change(&self) -> bool {
        !matches!(self, Self::StatusUpdated)
    }
}

/// A change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ResourceKind,
    pub key: ObjectKey,
    pub change: Change,
}

/// Object store consumed by the registry.
pub trait ObjectStore: Send + Sync {
    fn get(&self, kind: ResourceKind, key: &ObjectKey) -> IpamResult<Option<Object>>;

    /// Objects of `kind`, optionally restricted to one namespace, sorted by key.
    fn list(&self, kind: ResourceKind, namespace: Option<&str>) -> IpamResult<Vec<Object>>;

    /// Fails with Conflict if the object exists.
    fn create(&self, object: Object) -> IpamResult<Object>;

    /// Replace the spec. The generation is bumped when the spec differs.
    fn update(&self, object: Object) -> IpamResult<Object>;

    /// Replace the status, leaving spec and metadata alone.
    fn update_status(&self, object: &Object) -> IpamResult<()>;

    /// Request deletion. Removed immediately when no finalizers are present,
    /// otherwise flagged until the last finalizer is removed.
    fn delete(&self, kind: ResourceKind, key: &ObjectKey) -> IpamResult<()>;

    fn add_finalizer(&self, kind: ResourceKind, key: &ObjectKey, finalizer: &str) -> IpamResult<()>;

    /// Remove a finalizer. Removes the object if deletion was requested and
    /// no finalizers remain.
    fn remove_finalizer(
        &self,
        kind: ResourceKind,
        key: &ObjectKey,
        finalizer: &str,
    ) -> IpamResult<()>;

    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}

/// Typed [`ObjectStore::get`].
pub fn fetch<R: Resource>(store: &dyn ObjectStore, key: &ObjectKey) -> IpamResult<Option<R>> {
    match store.get(R::KIND, key)? {
        Some(object) => R::from_object(object)
            .map(Some)
            .ok_or_else(|| IpamError::store(format!("{} {} has the wrong kind", R::KIND, key))),
        None => Ok(None),
    }
}

/// Typed [`ObjectStore::list`].
pub fn list_of<R: Resource>(store: &dyn ObjectStore, namespace: Option<&str>) -> IpamResult<Vec<R>> {
    Ok(store
        .list(R::KIND, namespace)?
        .into_iter()
        .filter_map(R::from_object)
        .collect())
}
