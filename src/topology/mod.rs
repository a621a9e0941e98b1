//! Topology - topics, queues, bindings and the retry policy attached to them.
//!
//! ```text
//!                         ┌──────────────┐  orders.*  ┌─────────────────┐  5 failures  ┌───────────────┐
//!                    ┌───▶│   binding    │───────────▶│ inventory-queue │─────────────▶│ inventory-dlq │
//! ┌──────────────┐   │    └──────────────┘            └─────────────────┘              └───────────────┘
//! │  xyz.events  │───┤
//! └──────────────┘   │    ┌──────────────┐  orders.*  ┌─────────────────┐  5 failures  ┌───────────────┐
//!                    └───▶│   binding    │───────────▶│ payments-queue  │─────────────▶│ payments-dlq  │
//!                         └──────────────┘            └─────────────────┘              └───────────────┘
//! ```

mod declaration;
mod policy;
mod routing;
mod subscription;

pub use declaration::{DeadLetterTarget, QueueSpec, TopicSpec};
pub use policy::{
    RetryPolicy, DEFAULT_DLQ_RETENTION, DEFAULT_MAX_DELIVERY_COUNT, DEFAULT_VISIBILITY_TIMEOUT,
};
pub use routing::{validate_routing_key, BindingPattern, MAX_ROUTING_KEY_LEN};
pub use subscription::{Subscription, Topology, EVENTS_TOPIC};

pub(crate) use policy::exhausted;
