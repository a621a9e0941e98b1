//! Read-only views of queue contents for inspection and manual replay.

use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::state::StoredMessage;
use crate::broker::delivery::{DeathRecord, MessageId};
use crate::broker::lifecycle::MessageState;

/// A message currently held by a queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedMessage {
    pub message_id: MessageId,
    pub topic: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub state: MessageState,
    pub enqueued_at: SystemTime,
    pub deaths: Vec<DeathRecord>,
}

impl QueuedMessage {
    pub(super) fn from_stored(message: &StoredMessage) -> Self {
        Self {
            message_id: message.id,
            topic: message.topic.clone(),
            routing_key: message.routing_key.clone(),
            body: message.body.clone(),
            state: message.state,
            enqueued_at: message.enqueued_at,
            deaths: message.deaths.clone(),
        }
    }
}

/// A dead-lettered message in a form an operator can export.
///
/// The body is carried as base64 because poison messages are not
/// necessarily valid UTF-8.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message_id: MessageId,
    pub topic: String,
    pub routing_key: String,
    pub body_base64: String,
    pub dead_lettered_at: SystemTime,
    pub deaths: Vec<DeathRecord>,
}

impl DeadLetter {
    pub(super) fn from_stored(message: &StoredMessage) -> Self {
        Self {
            message_id: message.id,
            topic: message.topic.clone(),
            routing_key: message.routing_key.clone(),
            body_base64: STANDARD.encode(&message.body),
            dead_lettered_at: message.enqueued_at,
            deaths: message.deaths.clone(),
        }
    }

    /// The original message body, byte for byte.
    pub fn body(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.body_base64)
    }

    /// Most recent failure, if the message has one.
    pub fn last_death(&self) -> Option<&DeathRecord> {
        self.deaths.last()
    }
}
