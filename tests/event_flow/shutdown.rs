use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use xyz_events::broker::InMemoryBroker;
use xyz_events::consumer::{handler_fn, Consumer};
use xyz_events::orders::publish_order_created;
use xyz_events::publisher::Publisher;
use xyz_events::topology::Topology;
use xyz_events::BrokerClient;

use crate::support::{order, quick_options, wait_for};

fn broker() -> InMemoryBroker {
    let broker = InMemoryBroker::new();
    let client = BrokerClient::connect(broker.connector()).unwrap();
    Topology::standard().declare(&client).unwrap();
    broker
}

fn publish_one(broker: &InMemoryBroker) {
    let publisher = Publisher::per_call(broker.connector(), Topology::standard().topic);
    publish_order_created(&publisher, &order("o-1")).unwrap();
}

#[test]
fn stop_lets_the_in_flight_handler_finish() {
    let broker = broker();
    publish_one(&broker);

    let finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&finished);
    let consumer = Consumer::connect(
        broker.connector(),
        "inventory-queue",
        handler_fn(move |_| {
            thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }),
        quick_options().with_poll_interval(Duration::from_millis(10)),
    )
    .unwrap();
    let handle = consumer.spawn();

    wait_for(&handle, |s| s.received == 1);
    let stats = handle.stop();

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(stats.acked, 1);
    assert_eq!(broker.depth("inventory-queue"), 0);
    assert_eq!(broker.open_channels(), 0);
}

#[test]
fn stop_gives_up_after_shutdown_timeout() {
    let broker = broker();
    publish_one(&broker);

    let consumer = Consumer::connect(
        broker.connector(),
        "inventory-queue",
        handler_fn(|_| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        }),
        quick_options()
            .with_poll_interval(Duration::from_millis(10))
            .with_shutdown_timeout(Duration::from_millis(50)),
    )
    .unwrap();
    let handle = consumer.spawn();
    wait_for(&handle, |s| s.received == 1);

    let started = Instant::now();
    let stats = handle.stop();
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(stats.acked, 0);
    // Still in flight: the broker redelivers it if the handler never acks.
    assert_eq!(broker.in_flight_count("inventory-queue"), 1);
}

#[test]
fn idle_consumer_stops_promptly() {
    let broker = broker();
    let consumer = Consumer::connect(
        broker.connector(),
        "payments-queue",
        handler_fn(|_| Ok(())),
        quick_options().with_poll_interval(Duration::from_millis(20)),
    )
    .unwrap();
    let handle = consumer.spawn();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let stats = handle.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(stats.polls >= 1);
    assert_eq!(stats.received, 0);
}
