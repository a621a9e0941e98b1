//! Handler trait and the context passed to it.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::error::HandlerError;
use crate::broker::{Delivery, MessageId};
use crate::envelope::{DomainEvent, Event};

/// What a handler sees for one delivery: the decoded event plus the
/// broker metadata it arrived with.
pub struct Context<'a> {
    event: &'a Event,
    delivery: &'a Delivery,
}

impl<'a> Context<'a> {
    pub(crate) fn new(event: &'a Event, delivery: &'a Delivery) -> Self {
        Self { event, delivery }
    }

    pub fn event(&self) -> &Event {
        self.event
    }

    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }

    /// Deserialize the event data into any type.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        self.event.data_as::<T>().map_err(HandlerError::from)
    }

    /// Decode the event as a typed domain event, checking its type tag.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, HandlerError> {
        self.event.decode::<E>().map_err(HandlerError::from)
    }

    pub fn delivery(&self) -> &Delivery {
        self.delivery
    }

    pub fn message_id(&self) -> MessageId {
        self.delivery.message_id
    }

    pub fn routing_key(&self) -> &str {
        &self.delivery.routing_key
    }

    /// 1 on first delivery.
    pub fn delivery_count(&self) -> u32 {
        self.delivery.delivery_count
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery.is_redelivery()
    }
}

/// Business logic invoked once per delivered event.
///
/// Returning `Ok` acknowledges the message. Returning an error (or
/// panicking) negatively acknowledges it.
pub trait Handler: Send + Sync {
    fn handle(&self, ctx: &Context<'_>) -> Result<(), HandlerError>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn handle(&self, ctx: &Context<'_>) -> Result<(), HandlerError> {
        (**self).handle(ctx)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn handle(&self, ctx: &Context<'_>) -> Result<(), HandlerError> {
        (**self).handle(ctx)
    }
}

/// Handler backed by a closure. Built with [`handler_fn`].
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Context<'_>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, ctx: &Context<'_>) -> Result<(), HandlerError> {
        (self.0)(ctx)
    }
}

/// Turn a closure into a [`Handler`].
///
/// ```
/// use xyz_events::consumer::{handler_fn, HandlerError};
///
/// let handler = handler_fn(|ctx| {
///     if ctx.event_type() == "OrderCreated" {
///         Ok(())
///     } else {
///         Err(HandlerError::rejected("unexpected event"))
///     }
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Context<'_>) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler(f)
}
