//! Broker-side state: topics, queues, bindings and the messages in them.
//!
//! Every operation takes the current time explicitly so the owner decides
//! which clock drives visibility timeouts and retention.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::broker::delivery::{
    DeathReason, DeathRecord, Delivery, DeliveryAttempt, DeliveryStatus, DeliveryTag, MessageId,
};
use crate::broker::error::BrokerError;
use crate::broker::lifecycle::MessageState;
use crate::topology::{
    validate_routing_key, BindingPattern, QueueSpec, TopicSpec, MAX_ROUTING_KEY_LEN,
};

#[derive(Clone, Debug)]
pub(super) struct StoredMessage {
    pub id: MessageId,
    pub topic: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub enqueued_at: SystemTime,
    pub state: MessageState,
    pub attempts: Vec<DeliveryAttempt>,
    pub deaths: Vec<DeathRecord>,
}

impl StoredMessage {
    fn to_delivery(&self, tag: DeliveryTag, queue: &str) -> Delivery {
        Delivery {
            tag,
            message_id: self.id,
            queue: queue.to_string(),
            topic: self.topic.clone(),
            routing_key: self.routing_key.clone(),
            body: self.body.clone(),
            delivery_count: self.state.delivery_count(),
            deaths: self.deaths.clone(),
        }
    }

    fn close_attempt(&mut self, status: DeliveryStatus, error: Option<String>) {
        if let Some(attempt) = self.attempts.last_mut() {
            attempt.status = status;
            attempt.error = error;
        }
    }
}

pub(super) struct QueueState {
    pub spec: QueueSpec,
    pub ready: VecDeque<StoredMessage>,
    pub in_flight: BTreeMap<DeliveryTag, StoredMessage>,
}

impl QueueState {
    fn new(spec: QueueSpec) -> Self {
        Self {
            spec,
            ready: VecDeque::new(),
            in_flight: BTreeMap::new(),
        }
    }

    /// Earliest time an in-flight message becomes visible again.
    pub fn next_visible_at(&self) -> Option<SystemTime> {
        self.in_flight
            .values()
            .filter_map(|m| match m.state {
                MessageState::InFlight { visible_at, .. } => Some(visible_at),
                _ => None,
            })
            .min()
    }
}

struct Binding {
    topic: String,
    queue: String,
    pattern: BindingPattern,
}

pub(super) struct State {
    pub available: bool,
    /// Bumped on every restart. Channels opened in an older epoch are dead.
    pub epoch: u64,
    pub open_channels: usize,
    next_tag: u64,
    topics: HashMap<String, TopicSpec>,
    pub queues: HashMap<String, QueueState>,
    bindings: Vec<Binding>,
    tags: HashMap<DeliveryTag, String>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            available: true,
            epoch: 0,
            open_channels: 0,
            next_tag: 1,
            topics: HashMap::new(),
            queues: HashMap::new(),
            bindings: Vec::new(),
            tags: HashMap::new(),
        }
    }
}

impl State {
    pub fn has_topic(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    pub fn queue(&self, name: &str, operation: &'static str) -> Result<&QueueState, BrokerError> {
        self.queues
            .get(name)
            .ok_or_else(|| BrokerError::rejected(operation, format!("queue {} not found", name)))
    }

    pub fn bindings_of(&self, queue: &str) -> Vec<BindingPattern> {
        self.bindings
            .iter()
            .filter(|b| b.queue == queue)
            .map(|b| b.pattern.clone())
            .collect()
    }

    pub fn declare_topic(&mut self, spec: &TopicSpec) -> Result<(), BrokerError> {
        match self.topics.get(&spec.name) {
            Some(existing) if existing == spec => Ok(()),
            Some(existing) => Err(BrokerError::TopologyConflict(format!(
                "topic {} already declared with durable={}, requested durable={}",
                spec.name, existing.durable, spec.durable
            ))),
            None => {
                self.topics.insert(spec.name.clone(), spec.clone());
                info!(topic = %spec.name, durable = spec.durable, "topic declared");
                Ok(())
            }
        }
    }

    pub fn declare_queue(&mut self, spec: &QueueSpec) -> Result<(), BrokerError> {
        if let Some(existing) = self.queues.get(&spec.name) {
            if existing.spec == *spec {
                return Ok(());
            }
            return Err(BrokerError::TopologyConflict(format!(
                "queue {} already declared with different {}",
                spec.name,
                differing_attributes(&existing.spec, spec).join(", ")
            )));
        }

        if let Some(target) = &spec.dead_letter {
            if target.queue == spec.name {
                return Err(BrokerError::rejected(
                    "declare_queue",
                    format!("queue {} cannot dead-letter into itself", spec.name),
                ));
            }
            if target.max_delivery_count == 0 {
                return Err(BrokerError::rejected(
                    "declare_queue",
                    format!("queue {} needs a max delivery count of at least 1", spec.name),
                ));
            }
            if !self.queues.contains_key(&target.queue) {
                return Err(BrokerError::rejected(
                    "declare_queue",
                    format!("dead-letter queue {} not declared", target.queue),
                ));
            }
        }

        self.queues
            .insert(spec.name.clone(), QueueState::new(spec.clone()));
        info!(queue = %spec.name, durable = spec.durable, "queue declared");
        Ok(())
    }

    pub fn bind(
        &mut self,
        queue: &str,
        topic: &str,
        pattern: &BindingPattern,
    ) -> Result<(), BrokerError> {
        if !self.topics.contains_key(topic) {
            return Err(BrokerError::rejected("bind_queue", format!("topic {} not found", topic)));
        }
        self.queue(queue, "bind_queue")?;
        if pattern.as_str().len() > MAX_ROUTING_KEY_LEN {
            return Err(BrokerError::rejected("bind_queue", "binding pattern too long"));
        }

        let exists = self
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.topic == topic && b.pattern == *pattern);
        if !exists {
            self.bindings.push(Binding {
                topic: topic.to_string(),
                queue: queue.to_string(),
                pattern: pattern.clone(),
            });
            info!(queue, topic, pattern = %pattern, "queue bound");
        }
        Ok(())
    }

    /// Route a message to every queue with a matching binding. Returns the
    /// number of queues it reached.
    pub fn publish(
        &mut self,
        topic: &str,
        routing_key: &str,
        id: MessageId,
        body: &[u8],
        now: SystemTime,
    ) -> Result<usize, BrokerError> {
        if !self.topics.contains_key(topic) {
            return Err(BrokerError::rejected("publish", format!("topic {} not found", topic)));
        }
        validate_routing_key(routing_key)
            .map_err(|reason| BrokerError::rejected("publish", reason))?;

        let mut targets: Vec<&str> = Vec::new();
        for binding in &self.bindings {
            if binding.topic == topic
                && binding.pattern.matches(routing_key)
                && !targets.contains(&binding.queue.as_str())
            {
                targets.push(&binding.queue);
            }
        }
        let targets: Vec<String> = targets.into_iter().map(str::to_string).collect();

        for queue in &targets {
            if let Some(q) = self.queues.get_mut(queue) {
                q.ready.push_back(StoredMessage {
                    id,
                    topic: topic.to_string(),
                    routing_key: routing_key.to_string(),
                    body: body.to_vec(),
                    enqueued_at: now,
                    state: MessageState::Pending,
                    attempts: Vec::new(),
                    deaths: Vec::new(),
                });
            }
        }

        if targets.is_empty() {
            debug!(topic, routing_key, message_id = %id, "no binding matched, message dropped");
        }
        Ok(targets.len())
    }

    /// Hand out the next ready message of `queue`, if any.
    pub fn take_next(
        &mut self,
        queue: &str,
        now: SystemTime,
    ) -> Result<Option<Delivery>, BrokerError> {
        self.reap(now);
        let tag = DeliveryTag(self.next_tag);

        let q = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::rejected("receive", format!("queue {} not found", queue)))?;
        let Some(mut message) = q.ready.pop_front() else {
            return Ok(None);
        };

        let visible_at = now + q.spec.visibility_timeout;
        message.state = message.state.deliver(visible_at);
        message.attempts.push(DeliveryAttempt {
            tag,
            delivered_at: now,
            status: DeliveryStatus::Pending,
            error: None,
        });
        let delivery = message.to_delivery(tag, queue);
        q.in_flight.insert(tag, message);

        self.next_tag += 1;
        self.tags.insert(tag, queue.to_string());
        Ok(Some(delivery))
    }

    pub fn ack(&mut self, tag: DeliveryTag, now: SystemTime) -> Result<(), BrokerError> {
        self.reap(now);
        let (queue, mut message) = self.take_in_flight(tag, "ack")?;
        message.state = message.state.ack();
        message.close_attempt(DeliveryStatus::Acked, None);
        debug!(queue = %queue, message_id = %message.id, "message acknowledged");
        Ok(())
    }

    pub fn nack(
        &mut self,
        tag: DeliveryTag,
        reason: &str,
        now: SystemTime,
    ) -> Result<(), BrokerError> {
        self.reap(now);
        let (queue, mut message) = self.take_in_flight(tag, "nack")?;
        message.close_attempt(DeliveryStatus::Nacked, Some(reason.to_string()));
        self.fail(&queue, message, DeathReason::Rejected, Some(reason.to_string()), now);
        Ok(())
    }

    /// Expire in-flight messages whose visibility timeout elapsed and drop
    /// ready messages past their queue's retention.
    pub fn reap(&mut self, now: SystemTime) {
        let mut expired = Vec::new();
        for (name, q) in self.queues.iter_mut() {
            let tags: Vec<DeliveryTag> = q
                .in_flight
                .iter()
                .filter(|(_, m)| m.state.is_expired(now))
                .map(|(tag, _)| *tag)
                .collect();
            for tag in tags {
                if let Some(message) = q.in_flight.remove(&tag) {
                    expired.push((tag, name.clone(), message));
                }
            }

            if let Some(retention) = q.spec.retention {
                let before = q.ready.len();
                q.ready.retain(|m| match m.enqueued_at.checked_add(retention) {
                    Some(deadline) => deadline > now,
                    None => true,
                });
                let purged = before - q.ready.len();
                if purged > 0 {
                    info!(queue = %name, purged, "messages past retention discarded");
                }
            }
        }

        for (tag, queue, mut message) in expired {
            self.tags.remove(&tag);
            debug!(queue = %queue, message_id = %message.id, "visibility timeout expired");
            message.close_attempt(DeliveryStatus::Expired, None);
            let last_error = Some("visibility timeout expired".to_string());
            self.fail(&queue, message, DeathReason::Expired, last_error, now);
        }
    }

    /// Simulate a broker restart: non-durable objects vanish and every
    /// in-flight delivery counts as failed.
    pub fn restart(&mut self, now: SystemTime) {
        self.epoch += 1;
        self.open_channels = 0;

        let transient_topics: Vec<String> = self
            .topics
            .values()
            .filter(|t| !t.durable)
            .map(|t| t.name.clone())
            .collect();
        let transient_queues: Vec<String> = self
            .queues
            .values()
            .filter(|q| !q.spec.durable)
            .map(|q| q.spec.name.clone())
            .collect();

        for name in &transient_topics {
            self.topics.remove(name);
        }
        for name in &transient_queues {
            self.queues.remove(name);
        }
        self.bindings.retain(|b| {
            !transient_topics.contains(&b.topic) && !transient_queues.contains(&b.queue)
        });

        let mut returned = Vec::new();
        for (name, q) in self.queues.iter_mut() {
            for (_, message) in std::mem::take(&mut q.in_flight) {
                returned.push((name.clone(), message));
            }
        }
        self.tags.clear();

        for (queue, mut message) in returned {
            message.close_attempt(DeliveryStatus::Expired, None);
            let last_error = Some("broker restarted".to_string());
            self.fail(&queue, message, DeathReason::Expired, last_error, now);
        }

        warn!(
            epoch = self.epoch,
            dropped_topics = transient_topics.len(),
            dropped_queues = transient_queues.len(),
            "broker restarted"
        );
    }

    fn take_in_flight(
        &mut self,
        tag: DeliveryTag,
        operation: &'static str,
    ) -> Result<(String, StoredMessage), BrokerError> {
        let unknown = || BrokerError::rejected(operation, format!("unknown delivery tag {}", tag));
        let queue = self.tags.remove(&tag).ok_or_else(unknown)?;
        let message = self
            .queues
            .get_mut(&queue)
            .and_then(|q| q.in_flight.remove(&tag))
            .ok_or_else(unknown)?;
        Ok((queue, message))
    }

    /// Apply the queue's policy to a failed delivery: requeue it, or move it
    /// to the dead-letter queue once the retry budget is spent.
    fn fail(
        &mut self,
        queue: &str,
        mut message: StoredMessage,
        reason: DeathReason,
        last_error: Option<String>,
        now: SystemTime,
    ) {
        let Some(origin) = self.queues.get(queue) else {
            return;
        };
        let dead_letter = origin.spec.dead_letter.clone();
        message.state = message.state.fail(dead_letter.as_ref());

        let MessageState::DeadLettered { delivery_count } = message.state else {
            if let Some(q) = self.queues.get_mut(queue) {
                q.ready.push_back(message);
            }
            return;
        };

        let Some(target) = dead_letter.filter(|t| self.queues.contains_key(&t.queue)) else {
            warn!(queue, message_id = %message.id, "dead-letter queue missing, requeueing");
            message.state = MessageState::Redeliverable { delivery_count };
            if let Some(q) = self.queues.get_mut(queue) {
                q.ready.push_back(message);
            }
            return;
        };

        let mut deaths = message.deaths;
        deaths.push(DeathRecord {
            queue: queue.to_string(),
            reason,
            delivery_count,
            last_error,
            died_at: now,
            attempts: message.attempts,
        });

        warn!(
            queue,
            dead_letter_queue = %target.queue,
            message_id = %message.id,
            delivery_count,
            "message dead-lettered"
        );

        if let Some(dlq) = self.queues.get_mut(&target.queue) {
            dlq.ready.push_back(StoredMessage {
                id: message.id,
                topic: message.topic,
                routing_key: message.routing_key,
                body: message.body,
                enqueued_at: now,
                state: MessageState::Pending,
                attempts: Vec::new(),
                deaths,
            });
        }
    }
}

fn differing_attributes(a: &QueueSpec, b: &QueueSpec) -> Vec<&'static str> {
    let mut diff = Vec::new();
    if a.durable != b.durable {
        diff.push("durable");
    }
    if a.visibility_timeout != b.visibility_timeout {
        diff.push("visibility_timeout");
    }
    if a.retention != b.retention {
        diff.push("retention");
    }
    if a.dead_letter != b.dead_letter {
        diff.push("dead_letter");
    }
    diff
}
