//! Transport seam between the broker client and a concrete broker.

use std::time::Duration;

use super::delivery::{Delivery, DeliveryTag, MessageId};
use super::error::BrokerError;
use crate::topology::{BindingPattern, QueueSpec, TopicSpec};

/// A logical channel on an open broker connection.
///
/// Every operation is a synchronous round trip: it returns once the broker
/// has confirmed it or failed. Declarations and bindings are idempotent.
pub trait Channel: Send {
    fn declare_topic(&self, topic: &TopicSpec) -> Result<(), BrokerError>;

    fn declare_queue(&self, queue: &QueueSpec) -> Result<(), BrokerError>;

    fn bind_queue(
        &self,
        queue: &str,
        topic: &str,
        pattern: &BindingPattern,
    ) -> Result<(), BrokerError>;

    /// Publish a message. Returns once the broker has durably accepted it.
    fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        message_id: MessageId,
        body: &[u8],
    ) -> Result<(), BrokerError>;

    /// Take the next visible message, waiting up to `wait` for one to arrive.
    fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>, BrokerError>;

    fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError>;

    /// Return a delivery to the queue (or its dead-letter queue, per policy).
    fn nack(&self, tag: DeliveryTag, reason: &str) -> Result<(), BrokerError>;

    /// Release the channel and its connection. Idempotent.
    fn close(&mut self);
}

/// Opens connections to a broker.
///
/// Implementations are passed explicitly to publishers and consumers; there
/// is no process-wide connection.
pub trait Connector: Send + Sync {
    /// Open a connection with one channel on it.
    fn open(&self) -> Result<Box<dyn Channel>, BrokerError>;

    /// Where this connector points, safe to log.
    fn endpoint(&self) -> String;
}
