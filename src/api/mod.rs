//! Resource model stored in the object store.
//!
//! - [`meta`] - Metadata, conditions and scope identity
//! - [`tenant`], [`scope`], [`pool`], [`claim`] - The four resource kinds
//! - [`object`] - Tagged union and typed access
//! - [`naming`] - Hierarchical name codec

pub mod claim;
pub mod meta;
pub mod naming;
pub mod object;
pub mod pool;
pub mod scope;
pub mod tenant;

pub use claim::{Claim, ClaimSpec, ClaimStatus};
pub use meta::{
    AdminState, Condition, ObjectKey, ObjectMeta, ResourceKind, ResourceStatus, ScopeIdentity,
    FINALIZER,
};
pub use naming::{DottedNameCodec, NameCodec, ResourceName};
pub use object::{Object, Resource};
pub use pool::{Pool, PoolSpec, PoolStatus};
pub use scope::{Scope, ScopeSpec};
pub use tenant::{Tenant, TenantSpec};
