//! Orders - the `OrderCreated` event and the endpoint that publishes it.

#[cfg(feature = "http")]
pub mod http;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::MessageId;
use crate::envelope::DomainEvent;
use crate::publisher::{PublishError, Publisher};

/// Routing key for [`OrderCreated`].
pub const ROUTING_KEY: &str = "orders.created";

/// An order was placed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
    pub sku: String,
    pub qty: u32,
}

impl DomainEvent for OrderCreated {
    const EVENT_TYPE: &'static str = "OrderCreated";
}

impl OrderCreated {
    /// A new order with a generated id.
    pub fn new(sku: impl Into<String>, qty: u32) -> Self {
        Self {
            order_id: Uuid::new_v4().to_string(),
            sku: sku.into(),
            qty,
        }
    }

    pub fn with_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = order_id.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.order_id.trim().is_empty() {
            return Err("order_id must not be empty".to_string());
        }
        if self.sku.trim().is_empty() {
            return Err("sku must not be empty".to_string());
        }
        if self.qty == 0 {
            return Err("qty must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Publish `order` to the publisher's topic under `orders.created`.
pub fn publish_order_created(
    publisher: &Publisher,
    order: &OrderCreated,
) -> Result<MessageId, PublishError> {
    publisher.publish(ROUTING_KEY, order)
}
