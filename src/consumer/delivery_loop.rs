//! The consumer delivery loop.
//!
//! Pulls one message at a time from a bound queue, decodes it, runs the
//! handler and acks or nacks. Processing errors stop here; broker errors
//! close the connection and the loop reconnects after a delay.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::error::ProcessingError;
use super::handler::{Context, Handler};
use crate::broker::{BrokerClient, BrokerError, Connector, Delivery};
use crate::envelope;

/// Shortest pause between polls of an empty queue, and between retries
/// after a broker error, whatever the options say.
pub const MIN_IDLE_WAIT: Duration = Duration::from_millis(10);

/// Timing knobs for a [`Consumer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Longest a single receive blocks waiting for a message.
    pub poll_interval: Duration,
    /// Pause before reconnecting after the broker became unreachable.
    pub reconnect_delay: Duration,
    /// How long [`ConsumerHandle::stop`] waits for the in-flight handler.
    pub shutdown_timeout: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ConsumerOptions {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Statistics from a consumer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub polls: usize,
    pub received: usize,
    pub acked: usize,
    pub nacked: usize,
    pub malformed: usize,
    pub handler_failures: usize,
    pub panics: usize,
    pub broker_errors: usize,
    pub reconnects: usize,
}

/// What the loop did with one delivery.
#[derive(Debug)]
pub enum Disposition {
    Acked,
    /// Negatively acknowledged; the broker decides between redelivery and
    /// the dead-letter queue.
    Nacked(ProcessingError),
}

impl Disposition {
    pub fn is_acked(&self) -> bool {
        matches!(self, Disposition::Acked)
    }
}

/// Consumes one queue with one handler over its own broker connection.
///
/// Several consumers may compete on the same queue; the broker hands each
/// message to one of them at a time.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use xyz_events::broker::{BrokerClient, InMemoryBroker};
/// use xyz_events::consumer::{handler_fn, Consumer, ConsumerOptions};
/// use xyz_events::topology::Topology;
///
/// let broker = InMemoryBroker::new();
/// let topology = Topology::standard();
/// topology.declare(&BrokerClient::connect(broker.connector()).unwrap()).unwrap();
///
/// let consumer = Consumer::connect(
///     broker.connector(),
///     "inventory-queue",
///     handler_fn(|_ctx| Ok(())),
///     ConsumerOptions::default().with_poll_interval(Duration::from_millis(10)),
/// )
/// .unwrap();
///
/// let handle = consumer.spawn();
/// let stats = handle.stop();
/// assert_eq!(stats.received, 0);
/// ```
pub struct Consumer<H> {
    client: BrokerClient,
    queue: String,
    handler: H,
    options: ConsumerOptions,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl<H: Handler> Consumer<H> {
    /// Open a connection for consuming `queue`.
    pub fn connect(
        connector: Arc<dyn Connector>,
        queue: impl Into<String>,
        handler: H,
        options: ConsumerOptions,
    ) -> Result<Self, BrokerError> {
        let client = BrokerClient::connect(connector)?;
        Ok(Self {
            client,
            queue: queue.into(),
            handler,
            options,
            stats: Arc::new(Mutex::new(ConsumerStats::default())),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn options(&self) -> &ConsumerOptions {
        &self.options
    }

    pub fn stats(&self) -> ConsumerStats {
        lock(&self.stats).clone()
    }

    /// Receive and process at most one message, waiting up to the poll
    /// interval for one to arrive.
    ///
    /// Only broker errors are returned. Handler and decode failures are
    /// turned into a nack and reported as [`Disposition::Nacked`].
    pub fn poll_once(&self) -> Result<Option<Disposition>, BrokerError> {
        lock(&self.stats).polls += 1;

        let Some(delivery) = self
            .client
            .receive(&self.queue, self.options.poll_interval)?
        else {
            return Ok(None);
        };
        lock(&self.stats).received += 1;

        match self.process(&delivery) {
            Ok(()) => {
                self.client.ack(&delivery)?;
                lock(&self.stats).acked += 1;
                debug!(
                    queue = %self.queue,
                    message_id = %delivery.message_id,
                    delivery_count = delivery.delivery_count,
                    "message acknowledged"
                );
                Ok(Some(Disposition::Acked))
            }
            Err(err) => {
                warn!(
                    queue = %self.queue,
                    message_id = %delivery.message_id,
                    delivery_count = delivery.delivery_count,
                    error = %err,
                    "processing failed, returning message to broker"
                );
                self.client.nack(&delivery, &err.to_string())?;
                let mut stats = lock(&self.stats);
                stats.nacked += 1;
                match err {
                    ProcessingError::MalformedPayload(_) => stats.malformed += 1,
                    ProcessingError::HandlerFailure(_) => stats.handler_failures += 1,
                    ProcessingError::HandlerPanicked(_) => stats.panics += 1,
                }
                Ok(Some(Disposition::Nacked(err)))
            }
        }
    }

    fn process(&self, delivery: &Delivery) -> Result<(), ProcessingError> {
        let event = envelope::decode(&delivery.body)?;
        let ctx = Context::new(&event, delivery);

        match panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle(&ctx))) {
            Ok(result) => result.map_err(ProcessingError::from),
            Err(payload) => Err(ProcessingError::HandlerPanicked(panic_message(payload.as_ref()))),
        }
    }

    /// Run until `stop` receives a message or is disconnected, then close
    /// the connection.
    ///
    /// The stop signal is checked between messages, so an in-flight handler
    /// always finishes. Its message stays unacknowledged only if the handler
    /// outlives the shutdown timeout, in which case the broker redelivers it
    /// once the visibility timeout expires.
    pub fn run(&mut self, stop: &Receiver<()>) {
        info!(queue = %self.queue, endpoint = %self.client.endpoint(), "consumer started");

        loop {
            match stop.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            if !self.client.is_open() {
                match self.client.reconnect() {
                    Ok(()) => {
                        lock(&self.stats).reconnects += 1;
                        info!(queue = %self.queue, "consumer reconnected");
                    }
                    Err(err) => {
                        warn!(queue = %self.queue, error = %err, "reconnect failed");
                        if wait_for_stop(stop, self.options.reconnect_delay.max(MIN_IDLE_WAIT)) {
                            break;
                        }
                        continue;
                    }
                }
            }

            match self.poll_once() {
                Ok(Some(_)) => {}
                Ok(None) => {
                    // receive already blocked for poll_interval; top it up
                    // so a tiny interval cannot spin.
                    if self.options.poll_interval < MIN_IDLE_WAIT
                        && wait_for_stop(stop, MIN_IDLE_WAIT - self.options.poll_interval)
                    {
                        break;
                    }
                }
                Err(err) => {
                    lock(&self.stats).broker_errors += 1;
                    let delay = if err.is_transient() {
                        warn!(queue = %self.queue, error = %err, "broker connection lost");
                        self.options.reconnect_delay
                    } else {
                        error!(
                            queue = %self.queue,
                            error = %err,
                            "broker rejected consumer operation"
                        );
                        self.options.poll_interval
                    };
                    if wait_for_stop(stop, delay.max(MIN_IDLE_WAIT)) {
                        break;
                    }
                }
            }
        }

        self.client.close();
        info!(queue = %self.queue, "consumer stopped");
    }
}

impl<H: Handler + 'static> Consumer<H> {
    /// Run the delivery loop on a background thread.
    pub fn spawn(self) -> ConsumerHandle {
        let (stop_tx, stop_rx) = channel();
        let (done_tx, done_rx) = channel();
        let queue = self.queue.clone();
        let stats = Arc::clone(&self.stats);
        let shutdown_timeout = self.options.shutdown_timeout;

        let handle = thread::spawn(move || {
            let mut consumer = self;
            consumer.run(&stop_rx);
            drop(consumer);
            let _ = done_tx.send(());
        });

        ConsumerHandle {
            queue,
            stop_tx,
            done_rx,
            handle: Some(handle),
            stats,
            shutdown_timeout,
        }
    }
}

/// Handle to a consumer running on a background thread.
pub struct ConsumerHandle {
    queue: String,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<ConsumerStats>>,
    shutdown_timeout: Duration,
}

impl ConsumerHandle {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Live statistics.
    pub fn stats(&self) -> ConsumerStats {
        lock(&self.stats).clone()
    }

    /// Stop pulling new messages, let the in-flight handler finish and wait
    /// for the connection to be released, for up to the shutdown timeout.
    /// Returns the final statistics.
    pub fn stop(mut self) -> ConsumerStats {
        let _ = self.stop_tx.send(());

        match self.done_rx.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        error!(queue = %self.queue, "consumer thread panicked");
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    queue = %self.queue,
                    timeout = ?self.shutdown_timeout,
                    "consumer did not stop in time, detaching"
                );
                self.handle.take();
            }
        }

        self.stats()
    }

    /// Signal the consumer to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

/// Wait up to `delay` for a stop signal. Returns true if the loop should exit.
fn wait_for_stop(stop: &Receiver<()>, delay: Duration) -> bool {
    match stop.recv_timeout(delay) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

fn lock(stats: &Mutex<ConsumerStats>) -> MutexGuard<'_, ConsumerStats> {
    stats.lock().unwrap_or_else(|e| e.into_inner())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
