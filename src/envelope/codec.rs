//! Byte encoding of events.
//!
//! The wire shape is UTF-8 JSON `{"type": "<EventTypeName>", "data": {...}}`.
//! Object keys are emitted in sorted order, so the same event always encodes
//! to the same bytes.

use serde_json::Value;
use thiserror::Error;

use super::event::{kind_of, Event};

/// Bytes that do not have the envelope shape, or data that cannot be
/// represented in it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed payload: {reason}")]
pub struct MalformedPayload {
    reason: String,
}

impl MalformedPayload {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Encode an event into envelope bytes.
pub fn encode(event: &Event) -> Result<Vec<u8>, MalformedPayload> {
    if event.event_type.is_empty() {
        return Err(MalformedPayload::new("event type must not be empty"));
    }
    serde_json::to_vec(event).map_err(|e| MalformedPayload::new(e.to_string()))
}

/// Decode envelope bytes back into an event.
///
/// Extra top-level fields are ignored; `type` must be a non-empty string and
/// `data` must be an object.
pub fn decode(bytes: &[u8]) -> Result<Event, MalformedPayload> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| MalformedPayload::new(format!("invalid JSON: {}", e)))?;

    let mut envelope = match value {
        Value::Object(envelope) => envelope,
        other => {
            return Err(MalformedPayload::new(format!(
                "envelope must be an object, got {}",
                kind_of(&other)
            )))
        }
    };

    let event_type = match envelope.remove("type") {
        Some(Value::String(t)) if !t.is_empty() => t,
        Some(Value::String(_)) => return Err(MalformedPayload::new("empty `type`")),
        Some(other) => {
            return Err(MalformedPayload::new(format!(
                "`type` must be a string, got {}",
                kind_of(&other)
            )))
        }
        None => return Err(MalformedPayload::new("missing `type`")),
    };

    let data = match envelope.remove("data") {
        Some(Value::Object(data)) => data,
        Some(other) => {
            return Err(MalformedPayload::new(format!(
                "`data` must be an object, got {}",
                kind_of(&other)
            )))
        }
        None => return Err(MalformedPayload::new("missing `data`")),
    };

    Ok(Event::new(event_type, data))
}
