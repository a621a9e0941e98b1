//! Error types for message handlers and the delivery loop.

use std::error::Error;

use thiserror::Error;

use crate::envelope::MalformedPayload;

/// Error returned by a business handler.
///
/// Any error makes the delivery loop nack the message, so the broker
/// redelivers it until the queue's retry budget is spent.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler could not complete (downstream outage, timeout, ...).
    #[error("handler failed: {0}")]
    Failed(String),
    /// Business logic refused the event (invariant violation, unknown entity, ...).
    #[error("rejected: {0}")]
    Rejected(String),
    /// The event data did not match what the handler expected.
    #[error(transparent)]
    Malformed(#[from] MalformedPayload),
    #[error("handler error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed(reason.into())
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        HandlerError::Rejected(reason.into())
    }

    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        HandlerError::Other(err.into())
    }
}

/// Why the delivery loop negatively acknowledged a message.
///
/// Never escapes the loop; it is logged, counted and used as the nack reason.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    MalformedPayload(MalformedPayload),
    #[error(transparent)]
    HandlerFailure(HandlerError),
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),
}

impl From<MalformedPayload> for ProcessingError {
    fn from(err: MalformedPayload) -> Self {
        ProcessingError::MalformedPayload(err)
    }
}

impl From<HandlerError> for ProcessingError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Malformed(payload) => ProcessingError::MalformedPayload(payload),
            other => ProcessingError::HandlerFailure(other),
        }
    }
}
