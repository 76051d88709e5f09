//! Error types and gateway status mapping.
//!
//! Every failure on the allocation path is an [`IpamError`]. Reconcilers write
//! [`IpamError::reason`] into the acting resource's Ready condition and use
//! [`IpamError::requires_operator`] to choose between the fast retry ladder and
//! the regular poll interval. No variant is process-fatal.

use thiserror::Error;

/// Common IPAM error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IpamError {
    /// Malformed prefix, missing selector keys or an invalid request shape.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A parent resource is absent, not ready, or the scope index is not initialized.
    #[error("not ready: {message}")]
    NotReady { message: String },

    /// Route, scope or object not found.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Duplicate insert. Callers on the allocation path tolerate this as success.
    #[error("conflict: {what} already exists")]
    Conflict { what: String },

    /// No free block of the requested length remains in the parent prefix.
    #[error("address space exhausted: no free /{length} left in {parent}")]
    AddressSpaceExhausted { parent: String, length: u8 },

    /// The scope has no default prefix length for the requested purpose and family.
    #[error("missing configuration: {message}")]
    MissingConfiguration { message: String },

    /// No declared pool matches the claim selector.
    #[error("no available routes for selector {selector}")]
    NoAvailableRoute { selector: String },

    /// The object store rejected or failed an operation.
    #[error("store error: {message}")]
    Store { message: String },
}

impl IpamError {
    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a NotReady error.
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a Conflict error.
    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict { what: what.into() }
    }

    /// Create an AddressSpaceExhausted error.
    pub fn exhausted(parent: impl std::fmt::Display, length: u8) -> Self {
        Self::AddressSpaceExhausted {
            parent: parent.to_string(),
            length,
        }
    }

    /// Create a MissingConfiguration error.
    pub fn missing_configuration(message: impl Into<String>) -> Self {
        Self::MissingConfiguration {
            message: message.into(),
        }
    }

    /// Create a NoAvailableRoute error.
    pub fn no_available_route(selector: impl std::fmt::Display) -> Self {
        Self::NoAvailableRoute {
            selector: selector.to_string(),
        }
    }

    /// Create a Store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Stable reason identifier written to resource status.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "InvalidInput",
            Self::NotReady { .. } => "NotReady",
            Self::NotFound { .. } => "NotFound",
            Self::Conflict { .. } => "Conflict",
            Self::AddressSpaceExhausted { .. } => "AddressSpaceExhausted",
            Self::MissingConfiguration { .. } => "MissingConfiguration",
            Self::NoAvailableRoute { .. } => "NoAvailableRoute",
            Self::Store { .. } => "StoreError",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }

    /// Check if this error is expected to clear up on its own once dependency
    /// order catches up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotReady { .. } | Self::NoAvailableRoute { .. } | Self::Store { .. }
        )
    }

    /// Check if this error only clears after desired state is corrected.
    ///
    /// Such failures are still retried, but at the poll interval rather than
    /// on the fast ladder.
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            Self::AddressSpaceExhausted { .. } | Self::MissingConfiguration { .. }
        )
    }
}

/// Result type using IpamError.
pub type IpamResult<T> = Result<T, IpamError>;

/// Treat a Conflict from an idempotent insert as success.
pub fn tolerate_conflict(result: IpamResult<()>) -> IpamResult<()> {
    match result {
        Err(e) if e.is_conflict() => Ok(()),
        other => other,
    }
}

/// Treat a NotFound from an idempotent removal as success.
pub fn tolerate_not_found(result: IpamResult<()>) -> IpamResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

// ============================================================================
// Gateway status mapping
// ============================================================================

/// gRPC-style status codes carried on gateway replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrpcCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

/// Maps IpamError onto the allocation gateway's status codes.
pub struct GatewayErrorMapping;

impl GatewayErrorMapping {
    /// Map an IpamError to a gRPC status code.
    pub fn to_grpc_code(error: &IpamError) -> GrpcCode {
        match error {
            IpamError::InvalidInput { .. } => GrpcCode::InvalidArgument,
            IpamError::NotReady { .. } => GrpcCode::Unavailable,
            IpamError::NotFound { .. } => GrpcCode::NotFound,
            IpamError::Conflict { .. } => GrpcCode::AlreadyExists,
            IpamError::AddressSpaceExhausted { .. } => GrpcCode::ResourceExhausted,
            IpamError::MissingConfiguration { .. } => GrpcCode::FailedPrecondition,
            IpamError::NoAvailableRoute { .. } => GrpcCode::FailedPrecondition,
            IpamError::Store { .. } => GrpcCode::Internal,
        }
    }

    /// Structured message for gateway clients.
    pub fn to_error_message(error: &IpamError) -> String {
        format!("ipam: {}: {}", error.reason(), error)
    }
}
