//! Error types for the metrics engine.
//!
//! Variants follow the failure classes the collector and query engine
//! distinguish: whole-runtime failures abort a tick, per-container failures
//! only skip that container, and limit updates surface the runtime's message.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Main error type for the metrics engine.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Connectivity or listing failure against the container runtime.
    #[error("container runtime unreachable: {reason}")]
    RuntimeUnreachable { reason: String },

    /// Inspect or stats failure for a single container.
    #[error("container {container_id} unavailable: {reason}")]
    ContainerUnavailable { container_id: String, reason: String },

    /// The stats payload could not be decoded.
    #[error("malformed stats payload for {container_id}: {reason}")]
    MalformedPayload { container_id: String, reason: String },

    /// A runtime call exceeded its time budget.
    #[error("runtime call for {container_id} timed out after {timeout:?}")]
    Timeout { container_id: String, timeout: Duration },

    /// The runtime refused a resource limits change.
    #[error("{message}")]
    UpdateRejected { container_id: String, message: String },
}

impl AgentError {
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::RuntimeUnreachable {
            reason: reason.into(),
        }
    }

    pub fn unavailable(container_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContainerUnavailable {
            container_id: container_id.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(container_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            container_id: container_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error only concerns one container
    pub fn is_per_container(&self) -> bool {
        !matches!(self, Self::RuntimeUnreachable { .. })
    }
}
