//! IPAM registry - hierarchical IP prefix allocation control plane.
//!
//! The registry hands out IP prefixes from operator-declared pools. Resources
//! form a hierarchy (tenant → scope → {pool, claim}); each scope owns a prefix
//! index, and reconcilers keep the indexes in step with the declarative
//! objects held in an object store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            Object store (watch)     │    Allocation gateway     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Reconcile controller                        │
//! │   work queues │ Driver<Capability> │ fan-out │ retry ladder     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Allocation protocol                         │
//! │          Register │ DeRegister │ Declare │ Retract              │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │               Scope registry → PrefixIndex per scope            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Main runtime orchestration
//! - [`core::error`] - Error types and gateway status mapping
//!
//! ## Resources
//! - [`api`] - Tenants, scopes, pools, claims and the name codec
//! - [`store`] - Object store interface and in-memory implementation
//!
//! ## Allocation
//! - [`index`] - Prefix index, label selectors and placement strategies
//! - [`registry`] - Scope registry and retry ladder
//! - [`alloc`] - Allocation protocol and gateway
//!
//! ## Reconciliation
//! - [`reconcile`] - Phases, capabilities, driver, queues and controller
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - A prefix is present at most once per scope index.
//! - Dynamic allocations never overlap an existing route inside their pool.
//! - Register and DeRegister are idempotent; replay after a restart restores
//!   persisted prefixes.
//! - A scope's index is dropped only after in-flight operations on it finish.

// Core infrastructure
pub mod core;

// Resource model and storage
pub mod api;
pub mod store;

// Allocation engine
pub mod alloc;
pub mod index;
pub mod registry;

// Reconciliation
pub mod reconcile;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use alloc::{AllocationGateway, Allocator, RegisterInfo};
pub use index::{PrefixIndex, Route};
pub use reconcile::Controller;
pub use registry::{RetryLadder, ScopeRegistry};
