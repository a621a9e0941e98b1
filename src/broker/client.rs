//! Broker client - one connection, one channel, scoped release.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};

use super::channel::{Channel, Connector};
use super::delivery::{Delivery, MessageId};
use super::error::BrokerError;
use crate::topology::{BindingPattern, QueueSpec, TopicSpec};

/// Owns exactly one connection and one logical channel.
///
/// The channel is released when the client is closed or dropped, on every
/// exit path. When an operation fails because the broker is unreachable the
/// client closes itself; the owning component decides when to
/// [`reconnect`](BrokerClient::reconnect).
///
/// ```
/// use xyz_events::broker::{BrokerClient, InMemoryBroker};
/// use xyz_events::topology::TopicSpec;
///
/// let broker = InMemoryBroker::new();
/// let client = BrokerClient::connect(broker.connector()).unwrap();
/// client.declare_topic(&TopicSpec::new("xyz.events")).unwrap();
/// client.declare_topic(&TopicSpec::new("xyz.events")).unwrap(); // no-op
/// ```
pub struct BrokerClient {
    connector: Arc<dyn Connector>,
    channel: Mutex<Option<Box<dyn Channel>>>,
}

impl BrokerClient {
    /// Open a connection and a channel on it.
    pub fn connect(connector: Arc<dyn Connector>) -> Result<Self, BrokerError> {
        let channel = connector.open()?;
        debug!(endpoint = %connector.endpoint(), "broker connection opened");
        Ok(Self {
            connector,
            channel: Mutex::new(Some(channel)),
        })
    }

    /// Run `f` with a fresh connection that is closed when `f` returns,
    /// whether it succeeded or not.
    pub fn with_connection<T, E, F>(connector: Arc<dyn Connector>, f: F) -> Result<T, E>
    where
        F: FnOnce(&BrokerClient) -> Result<T, E>,
        E: From<BrokerError>,
    {
        let mut client = Self::connect(connector)?;
        let result = f(&client);
        client.close();
        result
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    pub fn is_open(&self) -> bool {
        self.slot().is_some()
    }

    /// Replace the channel with a new connection. Any previous channel is
    /// released first.
    pub fn reconnect(&self) -> Result<(), BrokerError> {
        let mut slot = self.slot();
        if let Some(mut old) = slot.take() {
            old.close();
        }
        *slot = Some(self.connector.open()?);
        debug!(endpoint = %self.connector.endpoint(), "broker connection re-opened");
        Ok(())
    }

    /// Release the channel and its connection. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut channel) = self.slot().take() {
            channel.close();
            debug!(endpoint = %self.connector.endpoint(), "broker connection closed");
        }
    }

    pub fn declare_topic(&self, topic: &TopicSpec) -> Result<(), BrokerError> {
        self.call(|ch| ch.declare_topic(topic))
    }

    pub fn declare_queue(&self, queue: &QueueSpec) -> Result<(), BrokerError> {
        self.call(|ch| ch.declare_queue(queue))
    }

    pub fn bind_queue(
        &self,
        queue: &str,
        topic: &str,
        pattern: &BindingPattern,
    ) -> Result<(), BrokerError> {
        self.call(|ch| ch.bind_queue(queue, topic, pattern))
    }

    /// Publish `body` and wait for the broker to accept it. Returns the id
    /// assigned to the message.
    pub fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<MessageId, BrokerError> {
        let message_id = MessageId::new();
        self.call(|ch| ch.publish(topic, routing_key, message_id, body))?;
        Ok(message_id)
    }

    pub fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>, BrokerError> {
        self.call(|ch| ch.receive(queue, wait))
    }

    pub fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.call(|ch| ch.ack(delivery.tag))
    }

    pub fn nack(&self, delivery: &Delivery, reason: &str) -> Result<(), BrokerError> {
        self.call(|ch| ch.nack(delivery.tag, reason))
    }

    fn slot(&self) -> MutexGuard<'_, Option<Box<dyn Channel>>> {
        self.channel.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn call<T>(
        &self,
        op: impl FnOnce(&dyn Channel) -> Result<T, BrokerError>,
    ) -> Result<T, BrokerError> {
        let mut slot = self.slot();
        let channel = slot
            .as_deref()
            .ok_or_else(|| BrokerError::unavailable("connection is closed"))?;

        let result = op(channel);
        if let Err(err) = &result {
            if err.is_transient() {
                warn!(
                    endpoint = %self.connector.endpoint(),
                    error = %err,
                    "dropping broker connection"
                );
                if let Some(mut channel) = slot.take() {
                    channel.close();
                }
            }
        }
        result
    }
}

impl Drop for BrokerClient {
    fn drop(&mut self) {
        self.close();
    }
}
