//! Message lifecycle as the broker sees it.
//!
//! ```text
//!  Pending ──deliver──▶ InFlight{1} ──ack──▶ Acked
//!                          │
//!                    fail (nack or timeout)
//!                          ▼
//!               Redeliverable{n} ──deliver──▶ InFlight{n+1} ── ... ──▶ DeadLettered{max}
//! ```
//!
//! The move to `DeadLettered` is driven by the queue's declared policy, never
//! by the consumer.

use std::time::SystemTime;

use crate::topology::{exhausted, DeadLetterTarget};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageState {
    /// Enqueued, never delivered.
    Pending,
    /// Delivered and hidden from other consumers until `visible_at`.
    InFlight {
        delivery_count: u32,
        visible_at: SystemTime,
    },
    /// Failed at least once and waiting to be delivered again.
    Redeliverable { delivery_count: u32 },
    /// Acknowledged; removed from the queue.
    Acked,
    /// Exhausted its retry budget and moved to the dead-letter queue.
    DeadLettered { delivery_count: u32 },
}

impl MessageState {
    pub fn delivery_count(&self) -> u32 {
        match *self {
            MessageState::Pending | MessageState::Acked => 0,
            MessageState::InFlight { delivery_count, .. }
            | MessageState::Redeliverable { delivery_count }
            | MessageState::DeadLettered { delivery_count } => delivery_count,
        }
    }

    /// Whether a consumer may receive the message now.
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            MessageState::Pending | MessageState::Redeliverable { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageState::Acked | MessageState::DeadLettered { .. })
    }

    /// Hand the message to a consumer. Only ready messages move.
    pub fn deliver(self, visible_at: SystemTime) -> Self {
        match self {
            MessageState::Pending => MessageState::InFlight {
                delivery_count: 1,
                visible_at,
            },
            MessageState::Redeliverable { delivery_count } => MessageState::InFlight {
                delivery_count: delivery_count + 1,
                visible_at,
            },
            other => other,
        }
    }

    /// Record a successful delivery. Only in-flight messages move.
    pub fn ack(self) -> Self {
        match self {
            MessageState::InFlight { .. } => MessageState::Acked,
            other => other,
        }
    }

    /// Record a failed delivery (nack or visibility timeout).
    ///
    /// Without a dead-letter target the message is redelivered forever.
    pub fn fail(self, dead_letter: Option<&DeadLetterTarget>) -> Self {
        match self {
            MessageState::InFlight { delivery_count, .. } => match dead_letter {
                Some(target) if exhausted(delivery_count, target.max_delivery_count) => {
                    MessageState::DeadLettered { delivery_count }
                }
                _ => MessageState::Redeliverable { delivery_count },
            },
            other => other,
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        matches!(self, MessageState::InFlight { visible_at, .. } if *visible_at <= now)
    }
}
