//! Request/release surface for external allocation clients.
//!
//! Requests name a claim the way claim objects are named; the owning scope
//! is derived from the name. The gateway does not create claim objects, so
//! it keeps its own ledger of handed-out prefixes to release by.

use super::protocol::{source_tag_or_default, Allocator, RegisterInfo};
use crate::api::{NameCodec, ObjectKey, ResourceKind};
use crate::core::error::{GatewayErrorMapping, GrpcCode, IpamError, IpamResult};
use crate::index::{LabelSelector, Labels};
use crate::reconcile::FanOut;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// An allocation request.
#[derive(Debug, Clone, Default)]
pub struct AllocationRequest {
    pub namespace: String,
    /// Claim name, e.g. `tenant.scope.claim`.
    pub claim: String,
    /// Explicit prefix, if the client wants a specific one.
    pub prefix: Option<String>,
    pub selector: Labels,
    pub source_tag: Labels,
}

/// A release request.
#[derive(Debug, Clone, Default)]
pub struct ReleaseRequest {
    pub namespace: String,
    pub claim: String,
    pub selector: Labels,
    pub source_tag: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub ready: bool,
    pub prefix: Option<String>,
    /// Wall-clock time of the reply in nanoseconds since the epoch.
    pub timestamp_ns: i64,
}

/// A failed request, carrying a gRPC-style status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct GatewayStatus {
    pub code: GrpcCode,
    pub message: String,
}

impl From<&IpamError> for GatewayStatus {
    fn from(error: &IpamError) -> Self {
        Self {
            code: GatewayErrorMapping::to_grpc_code(error),
            message: GatewayErrorMapping::to_error_message(error),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayStatus>;

pub struct AllocationGateway {
    allocator: Arc<Allocator>,
    codec: Arc<dyn NameCodec>,
    fanout: Option<Arc<FanOut>>,
    /// Prefix handed out per (namespace, claim).
    ledger: Mutex<HashMap<(String, String), String>>,
}

impl AllocationGateway {
    pub fn new(allocator: Arc<Allocator>, codec: Arc<dyn NameCodec>) -> Self {
        Self {
            allocator,
            codec,
            fanout: None,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    /// Re-queue the scope's pools after each successful request or release.
    pub fn with_fanout(mut self, fanout: Arc<FanOut>) -> Self {
        self.fanout = Some(fanout);
        self
    }

    pub fn request(&self, request: &AllocationRequest) -> GatewayResult<Reply> {
        let result = self.try_request(request);
        self.respond(&request.namespace, &request.claim, "request", result)
    }

    pub fn release(&self, request: &ReleaseRequest) -> GatewayResult<Reply> {
        let result = self.try_release(request).map(|()| None);
        self.respond(&request.namespace, &request.claim, "release", result)
    }

    /// Number of prefixes currently recorded in the ledger.
    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().len()
    }

    fn try_request(&self, request: &AllocationRequest) -> IpamResult<Option<String>> {
        let mut info = self.register_info(
            &request.namespace,
            &request.claim,
            &request.selector,
            &request.source_tag,
        )?;
        info.prefix = request.prefix.clone();
        info.persisted = self.recorded(&request.namespace, &request.claim);

        let prefix = self.allocator.register(&info)?.to_string();
        self.ledger.lock().insert(
            (request.namespace.clone(), request.claim.clone()),
            prefix.clone(),
        );
        Ok(Some(prefix))
    }

    fn try_release(&self, request: &ReleaseRequest) -> IpamResult<()> {
        let mut info = self.register_info(
            &request.namespace,
            &request.claim,
            &request.selector,
            &request.source_tag,
        )?;
        info.persisted = match self.recorded(&request.namespace, &request.claim) {
            Some(prefix) => Some(prefix),
            // Not handed out by this process: find it by its labels.
            None => self.allocator.lookup(&info)?.map(|p| p.to_string()),
        };

        self.allocator.deregister(&info)?;
        self.ledger
            .lock()
            .remove(&(request.namespace.clone(), request.claim.clone()));
        Ok(())
    }

    fn register_info(
        &self,
        namespace: &str,
        claim: &str,
        selector: &Labels,
        source_tag: &Labels,
    ) -> IpamResult<RegisterInfo> {
        let scope = self
            .codec
            .parent(ResourceKind::Claim, claim)?
            .ok_or_else(|| IpamError::invalid_input(format!("claim {} has no scope", claim)))?;
        let info = RegisterInfo {
            namespace: namespace.to_string(),
            scope,
            claim: claim.to_string(),
            prefix: None,
            selector: LabelSelector::new(selector.clone()),
            source_tag: source_tag_or_default(source_tag, claim),
            persisted: None,
        };
        info.purpose()?;
        info.address_family()?;
        Ok(info)
    }

    fn recorded(&self, namespace: &str, claim: &str) -> Option<String> {
        self.ledger
            .lock()
            .get(&(namespace.to_string(), claim.to_string()))
            .cloned()
    }

    fn respond(
        &self,
        namespace: &str,
        claim: &str,
        operation: &'static str,
        result: IpamResult<Option<String>>,
    ) -> GatewayResult<Reply> {
        match result {
            Ok(prefix) => {
                tracing::debug!(namespace, claim, operation, prefix = ?prefix, "gateway request served");
                if let Some(ref fanout) = self.fanout {
                    let key = ObjectKey::new(namespace, claim);
                    if let Err(e) = fanout.propagate(ResourceKind::Claim, &key) {
                        tracing::warn!(key = %key, error = %e, "fan-out failed");
                    }
                }
                Ok(Reply {
                    ready: true,
                    prefix,
                    timestamp_ns: now_ns(),
                })
            }
            Err(e) => {
                tracing::debug!(namespace, claim, operation, error = %e, "gateway request failed");
                Err(GatewayStatus::from(&e))
            }
        }
    }
}

fn now_ns() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
