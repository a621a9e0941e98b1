//! Publisher - domain event in, broker-accepted message out
//!
//! ```text
//! DomainEvent ──▶ Event{type, data} ──encode──▶ bytes ──▶ BrokerClient::publish(topic, routing_key)
//! ```
//!
//! The topic is declared idempotently once per connection, never per
//! message. Failed publishes are surfaced to the caller as-is.

mod error;
mod publisher;

pub use error::PublishError;
pub use publisher::{ConnectionMode, Publisher};
