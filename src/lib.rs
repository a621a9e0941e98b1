//! Topic-routed domain event distribution with at-least-once delivery.
//!
//! Events are wrapped in a `{type, data}` envelope, published to a topic
//! exchange under a routing key and fanned out to every queue whose binding
//! matches. Consumers ack or nack each delivery; the broker redelivers failed
//! messages and moves them to a dead-letter queue once the retry budget is
//! spent.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod orders;
pub mod publisher;
pub mod topology;

pub use broker::{BrokerClient, BrokerError, Delivery, InMemoryBroker, MessageId};
pub use config::{BrokerSettings, ConfigError};
pub use consumer::{
    handler_fn, Consumer, ConsumerHandle, ConsumerOptions, Dispatcher, HandlerError,
    ProcessingError,
};
pub use envelope::{DomainEvent, Event, MalformedPayload};
pub use publisher::{ConnectionMode, PublishError, Publisher};
pub use topology::{BindingPattern, RetryPolicy, Subscription, Topology, EVENTS_TOPIC};
