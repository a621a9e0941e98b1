//! Envelope codec: a typed event in, a transport-agnostic byte payload out.
//!
//! ```
//! use serde_json::json;
//! use xyz_events::envelope::{self, Event};
//!
//! let event = Event::from_data("OrderCreated", &json!({ "order_id": "o-1" })).unwrap();
//! let bytes = envelope::encode(&event).unwrap();
//! assert_eq!(envelope::decode(&bytes).unwrap(), event);
//! ```

mod codec;
mod event;

pub use codec::{decode, encode, MalformedPayload};
pub use event::{DomainEvent, Event};
