//! Subscriptions and the full topology a deployment declares.

use tracing::info;

use super::declaration::{QueueSpec, TopicSpec};
use super::policy::RetryPolicy;
use super::routing::BindingPattern;
use crate::broker::{BrokerClient, BrokerError};

/// Topic every service publishes domain events to.
pub const EVENTS_TOPIC: &str = "xyz.events";

/// A consuming service's interest in a topic.
///
/// A subscription for service `inventory` owns the queue `inventory-queue`,
/// paired with the dead-letter queue `inventory-dlq`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub service: String,
    pub patterns: Vec<BindingPattern>,
    pub policy: RetryPolicy,
}

impl Subscription {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            patterns: Vec::new(),
            policy: RetryPolicy::default(),
        }
    }

    /// Add a routing-key pattern this service wants delivered.
    pub fn bind(mut self, pattern: impl Into<BindingPattern>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn queue_name(&self) -> String {
        format!("{}-queue", self.service)
    }

    pub fn dlq_name(&self) -> String {
        format!("{}-dlq", self.service)
    }

    pub fn queue_spec(&self) -> QueueSpec {
        QueueSpec::new(self.queue_name())
            .with_visibility_timeout(self.policy.visibility_timeout)
            .with_dead_letter(self.dlq_name(), self.policy.max_delivery_count)
    }

    pub fn dlq_spec(&self) -> QueueSpec {
        QueueSpec::new(self.dlq_name())
            .with_visibility_timeout(self.policy.visibility_timeout)
            .with_retention(self.policy.dlq_retention)
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(routing_key))
    }
}

/// A topic and the subscriptions bound to it.
///
/// Declaring it is a one-time setup step run by deployment tooling, not
/// something the publish or consume path repeats per message.
///
/// ```
/// use xyz_events::broker::{BrokerClient, InMemoryBroker};
/// use xyz_events::topology::Topology;
///
/// let broker = InMemoryBroker::new();
/// let client = BrokerClient::connect(broker.connector()).unwrap();
/// Topology::standard().declare(&client).unwrap();
///
/// assert_eq!(
///     Topology::standard().routes("orders.created"),
///     vec!["inventory-queue".to_string(), "payments-queue".to_string()]
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    pub topic: TopicSpec,
    pub subscriptions: Vec<Subscription>,
}

impl Topology {
    pub fn new(topic: TopicSpec) -> Self {
        Self {
            topic,
            subscriptions: Vec::new(),
        }
    }

    /// `xyz.events` with the inventory and payments services bound to `orders.*`.
    pub fn standard() -> Self {
        Self::new(TopicSpec::new(EVENTS_TOPIC))
            .subscribe(Subscription::new("inventory").bind("orders.*"))
            .subscribe(Subscription::new("payments").bind("orders.*"))
    }

    pub fn subscribe(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn subscription(&self, service: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.service == service)
    }

    /// Queues a message published under `routing_key` would reach.
    pub fn routes(&self, routing_key: &str) -> Vec<String> {
        self.subscriptions
            .iter()
            .filter(|s| s.matches(routing_key))
            .map(Subscription::queue_name)
            .collect()
    }

    /// Declare the topic, every dead-letter queue, every queue and its bindings.
    ///
    /// Safe to run repeatedly. Fails with a topology conflict if anything
    /// already exists with different attributes.
    pub fn declare(&self, client: &BrokerClient) -> Result<(), BrokerError> {
        client.declare_topic(&self.topic)?;

        for subscription in &self.subscriptions {
            let queue = subscription.queue_spec();
            client.declare_queue(&subscription.dlq_spec())?;
            client.declare_queue(&queue)?;
            for pattern in &subscription.patterns {
                client.bind_queue(&queue.name, &self.topic.name, pattern)?;
            }
        }

        info!(
            topic = %self.topic.name,
            subscriptions = self.subscriptions.len(),
            "topology declared"
        );
        Ok(())
    }
}
