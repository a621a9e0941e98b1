//! In-memory broker implementation.

mod broker;
mod report;
mod state;

pub use broker::InMemoryBroker;
pub use report::{DeadLetter, QueuedMessage};
