//! Per-resource lifecycle phases.
//!
//! ```text
//! Pending ──► Initializing ──► Ready
//!    ▲             │             │
//!    └─────────────┴─────────────┘   (parent lost or local effect failed)
//!
//! any live phase ──► Terminating ──► Removed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a resource as recorded on its status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourcePhase {
    /// Parent missing or not ready.
    #[default]
    Pending,
    /// Parent ready, local effect not applied yet.
    Initializing,
    /// Local invariant holds and status reflects it.
    Ready,
    /// Deletion requested; cleanup must run before removal.
    Terminating,
    /// Cleanup done; the object is gone from the store.
    Removed,
}

impl ResourcePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Terminating => "terminating",
            Self::Removed => "removed",
        }
    }

    /// Check if transitioning to `next` is legal. Staying put is always legal.
    pub fn can_transition_to(&self, next: ResourcePhase) -> bool {
        use ResourcePhase::*;
        if *self == next {
            return true;
        }
        matches!(
            (*self, next),
            (Pending, Initializing)
                | (Pending, Ready)
                | (Initializing, Ready)
                | (Initializing, Pending)
                | (Ready, Pending)
                | (Ready, Initializing)
                | (Pending | Initializing | Ready, Terminating)
                | (Terminating, Removed)
        )
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Initializing | Self::Ready)
    }
}

impl fmt::Display for ResourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
