//! Allocation protocol and the external request surface.
//!
//! - [`protocol`] - Register, DeRegister, Declare and Retract
//! - [`gateway`] - Request/release gateway with a prefix ledger

pub mod gateway;
pub mod protocol;

pub use gateway::{
    AllocationGateway, AllocationRequest, GatewayResult, GatewayStatus, ReleaseRequest, Reply,
};
pub use protocol::{
    pool_labels, source_tag_or_default, Allocator, PrefixUsage, RegisterInfo, CLAIM_LABEL,
};
