//! Messages as handed to consumers.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a published message. Fanout copies share it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Broker-assigned handle for one delivery attempt. Used to ack or nack it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Status of a single delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Delivered, waiting for an ack or nack.
    Pending,
    Acked,
    Nacked,
    /// The visibility timeout elapsed without an ack.
    Expired,
}

/// One attempt to hand a message to a consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub tag: DeliveryTag,
    pub delivered_at: SystemTime,
    pub status: DeliveryStatus,
    /// Reason given with a nack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a message left its origin queue for a dead-letter queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathReason {
    /// The last delivery was negatively acknowledged.
    Rejected,
    /// The last delivery timed out.
    Expired,
}

/// Failure history attached to a dead-lettered message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathRecord {
    /// Queue the message was dead-lettered from.
    pub queue: String,
    pub reason: DeathReason,
    pub delivery_count: u32,
    pub last_error: Option<String>,
    pub died_at: SystemTime,
    pub attempts: Vec<DeliveryAttempt>,
}

/// A message handed to a consumer.
///
/// The message stays invisible to other consumers until it is acked,
/// nacked, or its visibility timeout elapses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub message_id: MessageId,
    pub queue: String,
    pub topic: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    /// 1 on first delivery, incremented by the broker on every redelivery.
    pub delivery_count: u32,
    /// Dead-letter history, oldest first. Empty unless the message was
    /// dead-lettered at least once.
    pub deaths: Vec<DeathRecord>,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}
