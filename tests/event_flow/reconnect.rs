use std::thread;
use std::time::Duration;

use xyz_events::consumer::handler_fn;
use xyz_events::orders::publish_order_created;
use xyz_events::publisher::PublishError;

use crate::support::{order, wait_for, Harness};

#[test]
fn publish_fails_visibly_while_broker_is_down() {
    let harness = Harness::new();
    let publisher = harness.publisher();

    harness.broker.set_available(false);
    let err = publish_order_created(&publisher, &order("o-1")).unwrap_err();
    assert!(matches!(err, PublishError::BrokerUnavailable(_)));
    assert!(err.is_retryable());

    harness.broker.set_available(true);
    publish_order_created(&publisher, &order("o-1")).unwrap();
    assert_eq!(harness.broker.depth("inventory-queue"), 1);
}

#[test]
fn consumer_survives_broker_restart() {
    let harness = Harness::new();
    let handle = harness.spawn_consumer("inventory-queue", handler_fn(|_| Ok(())));
    thread::sleep(Duration::from_millis(20));

    harness.broker.restart();
    assert!(harness.broker.has_queue("inventory-queue"));

    let publisher = harness.publisher();
    publish_order_created(&publisher, &order("o-1")).unwrap();

    let stats = wait_for(&handle, |s| s.acked == 1);
    assert_eq!(stats.acked, 1);
    assert!(stats.reconnects >= 1);
    handle.stop();
    assert_eq!(harness.broker.depth("inventory-queue"), 0);
}

#[test]
fn in_flight_message_survives_restart() {
    let harness = Harness::new();
    publish_order_created(&harness.publisher(), &order("o-1")).unwrap();

    let taken = harness
        .client
        .receive("inventory-queue", Duration::ZERO)
        .unwrap()
        .unwrap();
    harness.broker.restart();

    // The old delivery tag died with the connection.
    assert!(harness.client.ack(&taken).unwrap_err().is_transient());
    harness.client.reconnect().unwrap();

    let again = harness
        .client
        .receive("inventory-queue", Duration::ZERO)
        .unwrap()
        .unwrap();
    assert_eq!(again.message_id, taken.message_id);
    assert_eq!(again.delivery_count, 2);
}
