//! Reconciliation of the resource hierarchy.
//!
//! - [`phase`] - Resource lifecycle phases
//! - [`capability`] - Per-kind operations
//! - [`driver`] - Generic reconcile pass
//! - [`tenant`], [`scope`], [`pool`], [`claim`] - Capabilities per kind
//! - [`queue`] - Deduplicating work queue
//! - [`fanout`] - Dependency fan-out
//! - [`controller`] - Workers and watch pump

pub mod capability;
pub mod claim;
pub mod controller;
pub mod driver;
pub mod fanout;
pub mod phase;
pub mod pool;
pub mod queue;
pub mod scope;
pub mod tenant;

pub use capability::Capability;
pub use claim::ClaimCapability;
pub use controller::{Controller, ControllerStats};
pub use driver::{Driver, ReconcileOutcome};
pub use fanout::{dependents, FanOut, Queues};
pub use phase::ResourcePhase;
pub use pool::PoolCapability;
pub use queue::WorkQueue;
pub use scope::ScopeCapability;
pub use tenant::TenantCapability;
