//! Retry and dead-letter policy.
//!
//! The policy is declared on the queue when it is created and enforced by
//! the broker. Application code never moves a message to a dead-letter
//! queue itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deliveries allowed before a message is dead-lettered.
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 5;

/// Time a handler has to acknowledge a delivery before it is redelivered.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);

/// How long dead-lettered messages are kept for inspection or replay.
pub const DEFAULT_DLQ_RETENTION: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Retry budget applied to a consumer queue and its dead-letter queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_delivery_count: u32,
    pub visibility_timeout: Duration,
    pub dlq_retention: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_delivery_count: DEFAULT_MAX_DELIVERY_COUNT,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            dlq_retention: DEFAULT_DLQ_RETENTION,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_delivery_count(mut self, count: u32) -> Self {
        self.max_delivery_count = count;
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn with_dlq_retention(mut self, retention: Duration) -> Self {
        self.dlq_retention = retention;
        self
    }

    /// Whether a message that just failed its `delivery_count`-th delivery
    /// has exhausted the budget.
    pub fn is_exhausted(&self, delivery_count: u32) -> bool {
        exhausted(delivery_count, self.max_delivery_count)
    }
}

pub(crate) fn exhausted(delivery_count: u32, max_delivery_count: u32) -> bool {
    delivery_count >= max_delivery_count
}
