//! Broker - connections, channels and the message lifecycle
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Publisher / Consumer (per component)            │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       BrokerClient                           │
//! │  - one connection, one channel, released on close/drop      │
//! │  - drops the channel on connectivity errors                 │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Connector + Channel Traits                    │
//! │  declare / bind / publish / receive / ack / nack            │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                    │
//!          ▼                                    ▼
//! ┌─────────────────┐                 ┌─────────────────────┐
//! │ InMemoryBroker  │                 │  AMQP / SQS / ...   │
//! │   (included)    │                 │     (external)      │
//! └─────────────────┘                 └─────────────────────┘
//! ```
//!
//! Redelivery and dead-lettering are the broker's job. A consumer only acks
//! or nacks; the queue's declared policy decides what happens next.

mod channel;
mod client;
mod clock;
mod delivery;
mod error;
mod lifecycle;
mod memory;

pub use channel::{Channel, Connector};
pub use client::BrokerClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use delivery::{
    DeathReason, DeathRecord, Delivery, DeliveryAttempt, DeliveryStatus, DeliveryTag, MessageId,
};
pub use error::BrokerError;
pub use lifecycle::MessageState;
pub use memory::{DeadLetter, InMemoryBroker, QueuedMessage};
