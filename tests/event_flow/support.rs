//! Shared harness: an isolated broker with the standard topology declared.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use xyz_events::broker::{BrokerClient, InMemoryBroker, ManualClock};
use xyz_events::consumer::{Consumer, ConsumerHandle, ConsumerOptions, ConsumerStats, Handler};
use xyz_events::orders::OrderCreated;
use xyz_events::publisher::Publisher;
use xyz_events::topology::Topology;

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub broker: InMemoryBroker,
    pub topology: Topology,
    pub client: BrokerClient,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_topology(Topology::standard())
    }

    pub fn with_topology(topology: Topology) -> Self {
        let clock = Arc::new(ManualClock::new());
        let broker = InMemoryBroker::with_clock(clock.clone());
        let client = BrokerClient::connect(broker.connector()).unwrap();
        topology.declare(&client).unwrap();
        Self {
            clock,
            broker,
            topology,
            client,
        }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::connect(self.broker.connector(), self.topology.topic.clone()).unwrap()
    }

    /// A consumer whose polls return immediately when the queue is empty.
    pub fn consumer<H: Handler>(&self, queue: &str, handler: H) -> Consumer<H> {
        Consumer::connect(self.broker.connector(), queue, handler, quick_options()).unwrap()
    }

    /// A consumer running on its own thread, blocking briefly on each poll.
    pub fn spawn_consumer<H: Handler + 'static>(&self, queue: &str, handler: H) -> ConsumerHandle {
        let options = quick_options().with_poll_interval(Duration::from_millis(10));
        Consumer::connect(self.broker.connector(), queue, handler, options)
            .unwrap()
            .spawn()
    }
}

pub fn quick_options() -> ConsumerOptions {
    ConsumerOptions::default()
        .with_poll_interval(Duration::ZERO)
        .with_reconnect_delay(Duration::from_millis(10))
        .with_shutdown_timeout(Duration::from_secs(5))
}

pub fn order(id: &str) -> OrderCreated {
    OrderCreated::new("SKU-123", 2).with_id(id)
}

/// Poll `handle` until `done` holds or two seconds pass.
pub fn wait_for(handle: &ConsumerHandle, done: impl Fn(&ConsumerStats) -> bool) -> ConsumerStats {
    for _ in 0..400 {
        let stats = handle.stats();
        if done(&stats) {
            return stats;
        }
        thread::sleep(Duration::from_millis(5));
    }
    handle.stats()
}
