//! Error types for broker operations.

use thiserror::Error;

/// Error returned by broker connections and channels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The connection or channel could not be established, or was lost.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    /// The broker refused an operation (unknown queue, unknown delivery tag, ...).
    #[error("broker rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
    /// A declaration does not match what already exists on the broker.
    #[error("topology conflict: {0}")]
    TopologyConflict(String),
}

impl BrokerError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        BrokerError::Unavailable(reason.into())
    }

    pub fn rejected(operation: &'static str, reason: impl Into<String>) -> Self {
        BrokerError::Rejected {
            operation,
            reason: reason.into(),
        }
    }

    /// Connectivity failures are transient: the owner should drop the
    /// connection and reconnect. Everything else needs a different request
    /// or operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_))
    }
}
