//! Domain events and their `{type, data}` shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::codec::MalformedPayload;

/// A domain fact, produced once and never mutated.
///
/// `event_type` tells a consumer how to read `data` without any
/// out-of-band schema registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind tag (e.g., "OrderCreated").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event-specific fields.
    pub data: Map<String, Value>,
}

/// A typed domain event with a stable type tag.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use xyz_events::envelope::{DomainEvent, Event};
///
/// #[derive(Serialize, Deserialize, PartialEq, Debug)]
/// struct StockReserved { sku: String, qty: u32 }
///
/// impl DomainEvent for StockReserved {
///     const EVENT_TYPE: &'static str = "StockReserved";
/// }
///
/// let event = Event::from_domain(&StockReserved { sku: "SKU-1".into(), qty: 2 }).unwrap();
/// assert_eq!(event.event_type, "StockReserved");
/// assert_eq!(event.decode::<StockReserved>().unwrap().qty, 2);
/// ```
pub trait DomainEvent: Serialize + DeserializeOwned {
    const EVENT_TYPE: &'static str;
}

impl Event {
    /// Create an event from a type tag and an already-built field map.
    pub fn new(event_type: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Create an event from a type tag and any value that serializes to a JSON object.
    pub fn from_data<T: Serialize>(
        event_type: impl Into<String>,
        data: &T,
    ) -> Result<Self, MalformedPayload> {
        let event_type = event_type.into();
        match serde_json::to_value(data) {
            Ok(Value::Object(map)) => Ok(Self::new(event_type, map)),
            Ok(other) => Err(MalformedPayload::new(format!(
                "data for {} must serialize to an object, got {}",
                event_type,
                kind_of(&other)
            ))),
            Err(e) => Err(MalformedPayload::new(format!(
                "data for {} is not serializable: {}",
                event_type, e
            ))),
        }
    }

    /// Create an event from a typed domain event.
    pub fn from_domain<E: DomainEvent>(event: &E) -> Result<Self, MalformedPayload> {
        Self::from_data(E::EVENT_TYPE, event)
    }

    /// Decode `data` into a typed domain event, checking the type tag first.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, MalformedPayload> {
        if self.event_type != E::EVENT_TYPE {
            return Err(MalformedPayload::new(format!(
                "expected event type {}, got {}",
                E::EVENT_TYPE,
                self.event_type
            )));
        }
        self.data_as()
    }

    /// Decode `data` into any deserializable type, ignoring the type tag.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, MalformedPayload> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| {
            MalformedPayload::new(format!("invalid data for {}: {}", self.event_type, e))
        })
    }

    /// Check whether this event carries the given type tag.
    pub fn is<E: DomainEvent>(&self) -> bool {
        self.event_type == E::EVENT_TYPE
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
