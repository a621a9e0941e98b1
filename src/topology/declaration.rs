//! Topic and queue declarations.
//!
//! Declarations describe broker-side objects. Declaring the same object
//! twice with identical attributes is a no-op; declaring it with different
//! attributes is a topology conflict.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::policy::DEFAULT_VISIBILITY_TIMEOUT;

/// A named, durable routing point using topic (pattern) matching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSpec {
    pub name: String,
    pub durable: bool,
}

impl TopicSpec {
    /// A durable topic.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
        }
    }

    /// A topic that does not survive a broker restart.
    pub fn transient(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: false,
        }
    }
}

/// Where a queue sends messages that exhausted their retry budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterTarget {
    /// Name of the dead-letter queue.
    pub queue: String,
    /// Deliveries allowed before the message is dead-lettered.
    pub max_delivery_count: u32,
}

/// A durable buffer bound to a topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    /// How long a delivered-but-unacknowledged message stays hidden.
    pub visibility_timeout: Duration,
    /// How long a message may wait in the queue before it is discarded.
    /// `None` keeps messages until they are consumed.
    pub retention: Option<Duration>,
    pub dead_letter: Option<DeadLetterTarget>,
}

impl QueueSpec {
    /// A durable queue with the default visibility timeout, unbounded
    /// retention and no dead-letter target.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            retention: None,
            dead_letter: None,
        }
    }

    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn with_dead_letter(mut self, queue: impl Into<String>, max_delivery_count: u32) -> Self {
        self.dead_letter = Some(DeadLetterTarget {
            queue: queue.into(),
            max_delivery_count,
        });
        self
    }
}
