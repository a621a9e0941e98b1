use thiserror::Error;

use crate::broker::BrokerError;
use crate::envelope::MalformedPayload;

/// Error returned by [`Publisher`](super::Publisher) operations.
///
/// Publishes are never retried internally; the caller decides.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The connection could not be established, dropped, or the broker
    /// refused the publish.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(#[source] BrokerError),
    /// The topic already exists with incompatible attributes.
    #[error("topology conflict: {0}")]
    TopologyConflict(String),
    /// The event could not be encoded.
    #[error(transparent)]
    MalformedPayload(#[from] MalformedPayload),
}

impl PublishError {
    /// Whether a later attempt might succeed without operator intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::BrokerUnavailable(err) => err.is_transient(),
            PublishError::TopologyConflict(_) | PublishError::MalformedPayload(_) => false,
        }
    }
}

impl From<BrokerError> for PublishError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::TopologyConflict(message) => PublishError::TopologyConflict(message),
            other => PublishError::BrokerUnavailable(other),
        }
    }
}
