//! Publishing domain events to a topic.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::error::PublishError;
use crate::broker::{BrokerClient, Connector, MessageId};
use crate::envelope::{self, DomainEvent, Event};
use crate::topology::TopicSpec;

/// How a [`Publisher`] holds its broker connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// One long-lived connection, re-opened on the next publish after it drops.
    #[default]
    Pooled,
    /// A fresh connection for every publish, closed before returning.
    /// Only suitable for low publish rates.
    PerCall,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Pooled => write!(f, "pooled"),
            ConnectionMode::PerCall => write!(f, "per-call"),
        }
    }
}

/// Connection held by a pooled publisher, plus whether the topic has been
/// declared on it.
struct Pooled {
    client: BrokerClient,
    topic_declared: bool,
}

/// Wraps domain events in an envelope and publishes them to one topic.
///
/// A successful publish means the broker accepted the message, not that
/// any consumer processed it.
///
/// ## Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use xyz_events::broker::InMemoryBroker;
/// use xyz_events::envelope::DomainEvent;
/// use xyz_events::publisher::Publisher;
/// use xyz_events::topology::TopicSpec;
///
/// #[derive(Serialize, Deserialize)]
/// struct UserRegistered { user_id: String }
///
/// impl DomainEvent for UserRegistered {
///     const EVENT_TYPE: &'static str = "UserRegistered";
/// }
///
/// let broker = InMemoryBroker::new();
/// let publisher = Publisher::connect(broker.connector(), TopicSpec::new("xyz.events")).unwrap();
///
/// publisher
///     .publish("users.registered", &UserRegistered { user_id: "u-1".into() })
///     .unwrap();
/// assert!(broker.has_topic("xyz.events"));
/// ```
pub struct Publisher {
    connector: Arc<dyn Connector>,
    topic: TopicSpec,
    mode: ConnectionMode,
    pooled: Mutex<Option<Pooled>>,
}

impl Publisher {
    /// Create a pooled publisher and open its connection.
    pub fn connect(connector: Arc<dyn Connector>, topic: TopicSpec) -> Result<Self, PublishError> {
        let client = BrokerClient::connect(Arc::clone(&connector))?;
        info!(endpoint = %client.endpoint(), topic = %topic.name, "publisher connected");
        Ok(Self {
            connector,
            topic,
            mode: ConnectionMode::Pooled,
            pooled: Mutex::new(Some(Pooled {
                client,
                topic_declared: false,
            })),
        })
    }

    /// Create a publisher that connects for every publish.
    pub fn per_call(connector: Arc<dyn Connector>, topic: TopicSpec) -> Self {
        Self {
            connector,
            topic,
            mode: ConnectionMode::PerCall,
            pooled: Mutex::new(None),
        }
    }

    /// Create a publisher in the given mode.
    pub fn with_mode(
        connector: Arc<dyn Connector>,
        topic: TopicSpec,
        mode: ConnectionMode,
    ) -> Result<Self, PublishError> {
        match mode {
            ConnectionMode::Pooled => Self::connect(connector, topic),
            ConnectionMode::PerCall => Ok(Self::per_call(connector, topic)),
        }
    }

    pub fn topic(&self) -> &TopicSpec {
        &self.topic
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// Publish a typed domain event under `routing_key`.
    pub fn publish<E: DomainEvent>(
        &self,
        routing_key: &str,
        event: &E,
    ) -> Result<MessageId, PublishError> {
        let event = Event::from_domain(event)?;
        self.publish_event(routing_key, &event)
    }

    /// Publish an already-built event under `routing_key`.
    pub fn publish_event(
        &self,
        routing_key: &str,
        event: &Event,
    ) -> Result<MessageId, PublishError> {
        let body = envelope::encode(event)?;

        let message_id = match self.mode {
            ConnectionMode::Pooled => self.publish_pooled(routing_key, &body)?,
            ConnectionMode::PerCall => {
                BrokerClient::with_connection(Arc::clone(&self.connector), |client| {
                    client.declare_topic(&self.topic)?;
                    client
                        .publish(&self.topic.name, routing_key, &body)
                        .map_err(PublishError::from)
                })?
            }
        };

        debug!(
            topic = %self.topic.name,
            routing_key,
            event_type = %event.event_type,
            message_id = %message_id,
            "event published"
        );
        Ok(message_id)
    }

    fn publish_pooled(&self, routing_key: &str, body: &[u8]) -> Result<MessageId, PublishError> {
        let mut slot = self.slot();
        let mut pooled = match slot.take() {
            Some(pooled) => pooled,
            None => Pooled {
                client: BrokerClient::connect(Arc::clone(&self.connector))?,
                topic_declared: false,
            },
        };
        let result = self.publish_on(&mut pooled, routing_key, body);
        *slot = Some(pooled);
        result
    }

    fn publish_on(
        &self,
        pooled: &mut Pooled,
        routing_key: &str,
        body: &[u8],
    ) -> Result<MessageId, PublishError> {
        if !pooled.client.is_open() {
            pooled.client.reconnect()?;
            pooled.topic_declared = false;
            info!(endpoint = %pooled.client.endpoint(), "publisher reconnected");
        }
        if !pooled.topic_declared {
            pooled.client.declare_topic(&self.topic)?;
            pooled.topic_declared = true;
        }
        Ok(pooled.client.publish(&self.topic.name, routing_key, body)?)
    }

    /// Release the pooled connection, if any. A later publish reconnects.
    pub fn close(&self) {
        if let Some(mut pooled) = self.slot().take() {
            pooled.client.close();
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Pooled>> {
        self.pooled.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("endpoint", &self.connector.endpoint())
            .field("topic", &self.topic.name)
            .field("mode", &self.mode)
            .finish()
    }
}
