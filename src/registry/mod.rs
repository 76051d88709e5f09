//! Scope lifecycle and retry scheduling.
//!
//! - [`scope`] - Scope registry and per-scope locking
//! - [`retry`] - Retry ladder

pub mod retry;
pub mod scope;

pub use retry::{LadderStats, RetryLadder, RetryPolicy};
pub use scope::{RegistryStats, ScopeKey, ScopeRegistry};
