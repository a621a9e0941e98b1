//! In-process broker with topic routing, visibility timeouts and dead-lettering.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::report::{DeadLetter, QueuedMessage};
use super::state::State;
use crate::broker::channel::{Channel, Connector};
use crate::broker::clock::{Clock, SystemClock};
use crate::broker::delivery::{Delivery, DeliveryTag, MessageId};
use crate::broker::error::BrokerError;
use crate::topology::{BindingPattern, QueueSpec, TopicSpec};

const DEFAULT_NAME: &str = "default";

struct Inner {
    name: String,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    /// Signalled whenever a message may have become ready.
    arrived: Condvar,
}

/// In-memory broker for tests and single-process deployments.
///
/// Cloning gives another handle to the same broker. Each test can build
/// its own isolated instance; there is no global registry.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use xyz_events::broker::{BrokerClient, InMemoryBroker};
/// use xyz_events::topology::{BindingPattern, QueueSpec, TopicSpec};
///
/// let broker = InMemoryBroker::new();
/// let client = BrokerClient::connect(broker.connector()).unwrap();
///
/// client.declare_topic(&TopicSpec::new("xyz.events")).unwrap();
/// client.declare_queue(&QueueSpec::new("audit-queue")).unwrap();
/// client.bind_queue("audit-queue", "xyz.events", &BindingPattern::all()).unwrap();
///
/// client.publish("xyz.events", "orders.created", br#"{"type":"OrderCreated","data":{}}"#).unwrap();
/// assert_eq!(broker.depth("audit-queue"), 1);
///
/// let delivery = client.receive("audit-queue", Duration::ZERO).unwrap().unwrap();
/// assert_eq!(delivery.delivery_count, 1);
/// client.ack(&delivery).unwrap();
/// assert_eq!(broker.depth("audit-queue"), 0);
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::build(DEFAULT_NAME, Arc::new(SystemClock))
    }

    /// A broker whose visibility timeouts and retention follow `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::build(DEFAULT_NAME, clock)
    }

    /// Build a broker from a `memory://<name>` URL.
    pub fn from_url(url: &str) -> Result<Self, BrokerError> {
        let name = url.strip_prefix("memory://").ok_or_else(|| {
            BrokerError::unavailable(format!("unsupported broker url scheme: {}", url))
        })?;
        let name = name.trim_end_matches('/');
        let name = if name.is_empty() { DEFAULT_NAME } else { name };
        Ok(Self::build(name, Arc::new(SystemClock)))
    }

    fn build(name: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                clock,
                state: Mutex::new(State::default()),
                arrived: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// A connector that opens channels on this broker.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    /// Simulate an outage. While unavailable, connecting and every channel
    /// operation fail with `BrokerError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        let mut state = self.lock();
        state.available = available;
        info!(broker = %self.inner.name, available, "broker availability changed");
        drop(state);
        self.inner.arrived.notify_all();
    }

    pub fn is_available(&self) -> bool {
        self.lock().available
    }

    /// Simulate a restart. Non-durable topics and queues are lost, in-flight
    /// deliveries count as failed, and every open channel is reset.
    pub fn restart(&self) {
        let now = self.inner.clock.now();
        self.lock().restart(now);
        self.inner.arrived.notify_all();
    }

    /// Wake every blocked receive so it re-checks visibility against the
    /// clock. Needed after moving a [`ManualClock`](crate::broker::ManualClock)
    /// forward; with the system clock, receivers already wake when the next
    /// in-flight message becomes visible.
    pub fn tick(&self) {
        self.inner.arrived.notify_all();
    }

    pub fn open_channels(&self) -> usize {
        self.lock().open_channels
    }

    pub fn has_topic(&self, name: &str) -> bool {
        self.lock().has_topic(name)
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.lock().queues.contains_key(name)
    }

    pub fn bindings(&self, queue: &str) -> Vec<BindingPattern> {
        self.lock().bindings_of(queue)
    }

    /// Ready plus in-flight messages. Zero for unknown queues.
    pub fn depth(&self, queue: &str) -> usize {
        self.ready_count(queue) + self.in_flight_count(queue)
    }

    pub fn ready_count(&self, queue: &str) -> usize {
        let state = self.reaped();
        state.queues.get(queue).map_or(0, |q| q.ready.len())
    }

    pub fn in_flight_count(&self, queue: &str) -> usize {
        let state = self.reaped();
        state.queues.get(queue).map_or(0, |q| q.in_flight.len())
    }

    /// Snapshot of a queue's messages: ready ones in delivery order, then
    /// in-flight ones.
    pub fn peek(&self, queue: &str) -> Result<Vec<QueuedMessage>, BrokerError> {
        let state = self.reaped();
        let q = state.queue(queue, "peek")?;
        Ok(q.ready
            .iter()
            .chain(q.in_flight.values())
            .map(QueuedMessage::from_stored)
            .collect())
    }

    /// Export the ready contents of a dead-letter queue.
    pub fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>, BrokerError> {
        let state = self.reaped();
        let q = state.queue(queue, "dead_letters")?;
        Ok(q.ready.iter().map(DeadLetter::from_stored).collect())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reaped(&self) -> MutexGuard<'_, State> {
        let now = self.inner.clock.now();
        let mut state = self.lock();
        state.reap(now);
        state
    }
}

impl Connector for InMemoryBroker {
    fn open(&self) -> Result<Box<dyn Channel>, BrokerError> {
        let mut state = self.lock();
        if !state.available {
            return Err(BrokerError::unavailable(format!(
                "connection to memory://{} refused",
                self.inner.name
            )));
        }
        state.open_channels += 1;
        Ok(Box::new(InMemoryChannel {
            inner: Arc::clone(&self.inner),
            epoch: state.epoch,
            closed: false,
        }))
    }

    fn endpoint(&self) -> String {
        format!("memory://{}", self.inner.name)
    }
}

/// Channel on an [`InMemoryBroker`].
struct InMemoryChannel {
    inner: Arc<Inner>,
    epoch: u64,
    closed: bool,
}

impl InMemoryChannel {
    /// Lock the broker state, failing if this channel can no longer talk to it.
    fn state(&self) -> Result<MutexGuard<'_, State>, BrokerError> {
        let state = self
            .inner
            .state
            .lock()
            .map_err(|_| BrokerError::unavailable("broker state poisoned"))?;
        self.check(&state)?;
        Ok(state)
    }

    fn check(&self, state: &State) -> Result<(), BrokerError> {
        if self.closed {
            return Err(BrokerError::unavailable("channel is closed"));
        }
        if !state.available {
            return Err(BrokerError::unavailable("broker is unreachable"));
        }
        if state.epoch != self.epoch {
            return Err(BrokerError::unavailable("connection reset by broker restart"));
        }
        Ok(())
    }
}

impl Channel for InMemoryChannel {
    fn declare_topic(&self, topic: &TopicSpec) -> Result<(), BrokerError> {
        self.state()?.declare_topic(topic)
    }

    fn declare_queue(&self, queue: &QueueSpec) -> Result<(), BrokerError> {
        self.state()?.declare_queue(queue)
    }

    fn bind_queue(
        &self,
        queue: &str,
        topic: &str,
        pattern: &BindingPattern,
    ) -> Result<(), BrokerError> {
        self.state()?.bind(queue, topic, pattern)
    }

    fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        message_id: MessageId,
        body: &[u8],
    ) -> Result<(), BrokerError> {
        let now = self.inner.clock.now();
        let routed = self
            .state()?
            .publish(topic, routing_key, message_id, body, now)?;
        if routed > 0 {
            self.inner.arrived.notify_all();
        }
        Ok(())
    }

    fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>, BrokerError> {
        let deadline = Instant::now()
            .checked_add(wait)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(24 * 60 * 60));
        let mut state = self.state()?;

        loop {
            let now = self.inner.clock.now();
            if let Some(delivery) = state.take_next(queue, now)? {
                debug!(
                    queue,
                    message_id = %delivery.message_id,
                    delivery_count = delivery.delivery_count,
                    "message delivered"
                );
                return Ok(Some(delivery));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            // Wake up when the next in-flight message becomes visible, if
            // that comes before the deadline.
            let until_visible = state
                .queue(queue, "receive")?
                .next_visible_at()
                .and_then(|at| at.duration_since(now).ok())
                .filter(|d| !d.is_zero());
            let timeout = until_visible.map_or(remaining, |d| d.min(remaining));

            let (guard, _) = self
                .inner
                .arrived
                .wait_timeout(state, timeout)
                .map_err(|_| BrokerError::unavailable("broker state poisoned"))?;
            state = guard;
            self.check(&state)?;
        }
    }

    fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        let now = self.inner.clock.now();
        self.state()?.ack(tag, now)
    }

    fn nack(&self, tag: DeliveryTag, reason: &str) -> Result<(), BrokerError> {
        let now = self.inner.clock.now();
        self.state()?.nack(tag, reason, now)?;
        self.inner.arrived.notify_all();
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.epoch == self.epoch {
            state.open_channels = state.open_channels.saturating_sub(1);
        }
    }
}

impl Drop for InMemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}
