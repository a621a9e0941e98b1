//! Routes events to handlers by their `type` tag.

use std::collections::HashMap;

use tracing::debug;

use super::error::HandlerError;
use super::handler::{Context, Handler};
use crate::envelope::DomainEvent;

type BoxedHandler = Box<dyn Fn(&Context<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// A [`Handler`] made of one handler function per event type.
///
/// Events with no registered handler are acknowledged and logged: a queue
/// bound with a wide pattern sees event types it does not care about, and
/// redelivering them could never succeed.
///
/// ## Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use xyz_events::consumer::Dispatcher;
/// use xyz_events::envelope::DomainEvent;
///
/// #[derive(Serialize, Deserialize)]
/// struct PaymentCaptured { order_id: String, amount: u64 }
///
/// impl DomainEvent for PaymentCaptured {
///     const EVENT_TYPE: &'static str = "PaymentCaptured";
/// }
///
/// let dispatcher = Dispatcher::new()
///     .on_event(|payment: PaymentCaptured, _ctx| {
///         assert!(payment.amount > 0);
///         Ok(())
///     })
///     .on("OrderCancelled", |ctx| {
///         let _data: serde_json::Value = ctx.data()?;
///         Ok(())
///     });
///
/// assert!(dispatcher.handles("PaymentCaptured"));
/// assert!(!dispatcher.handles("OrderCreated"));
/// ```
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, BoxedHandler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event type. Replaces any earlier one.
    pub fn on<F>(mut self, event_type: &str, handler: F) -> Self
    where
        F: Fn(&Context<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(event_type.to_string(), Box::new(handler));
        self
    }

    /// Register a handler that receives the event already decoded.
    ///
    /// Data that does not decode into `E` fails as a malformed payload.
    pub fn on_event<E, F>(self, handler: F) -> Self
    where
        E: DomainEvent + 'static,
        F: Fn(E, &Context<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.on(E::EVENT_TYPE, move |ctx| {
            let event = ctx.decode::<E>()?;
            handler(event, ctx)
        })
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Handler for Dispatcher {
    fn handle(&self, ctx: &Context<'_>) -> Result<(), HandlerError> {
        match self.handlers.get(ctx.event_type()) {
            Some(handler) => handler(ctx),
            None => {
                debug!(
                    event_type = ctx.event_type(),
                    message_id = %ctx.message_id(),
                    "no handler registered, acknowledging"
                );
                Ok(())
            }
        }
    }
}
