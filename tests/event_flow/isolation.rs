use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use xyz_events::consumer::{Disposition, Dispatcher, ProcessingError};
use xyz_events::orders::{publish_order_created, OrderCreated};

use crate::support::{order, Harness};

#[test]
fn malformed_payload_does_not_block_valid_messages() {
    let harness = Harness::new();
    harness
        .client
        .publish("xyz.events", "orders.created", b"{\"data\":{}}")
        .unwrap();
    publish_order_created(&harness.publisher(), &order("o-1")).unwrap();

    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    let consumer = harness.consumer(
        "inventory-queue",
        Dispatcher::new().on_event(move |order: OrderCreated, _ctx| {
            assert_eq!(order.order_id, "o-1");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    let first = consumer.poll_once().unwrap().unwrap();
    assert!(matches!(
        first,
        Disposition::Nacked(ProcessingError::MalformedPayload(_))
    ));
    assert!(consumer.poll_once().unwrap().unwrap().is_acked());
    assert_eq!(handled.load(Ordering::SeqCst), 1);

    // The poison message keeps failing until it is dead-lettered.
    for _ in 0..4 {
        consumer.poll_once().unwrap();
    }
    assert!(consumer.poll_once().unwrap().is_none());
    assert_eq!(harness.broker.depth("inventory-dlq"), 1);

    let stats = consumer.stats();
    assert_eq!(stats.malformed, 5);
    assert_eq!(stats.acked, 1);
}

#[test]
fn data_that_does_not_fit_the_type_is_malformed() {
    let harness = Harness::new();
    harness
        .client
        .publish(
            "xyz.events",
            "orders.created",
            br#"{"type":"OrderCreated","data":{"order_id":"o-1","qty":"two"}}"#,
        )
        .unwrap();

    let consumer = harness.consumer(
        "inventory-queue",
        Dispatcher::new().on_event(|_: OrderCreated, _ctx| Ok(())),
    );
    assert!(matches!(
        consumer.poll_once().unwrap().unwrap(),
        Disposition::Nacked(ProcessingError::MalformedPayload(_))
    ));
}

#[test]
fn unknown_event_types_are_acknowledged() {
    let harness = Harness::new();
    harness
        .client
        .publish(
            "xyz.events",
            "orders.cancelled",
            br#"{"type":"OrderCancelled","data":{"order_id":"o-1"}}"#,
        )
        .unwrap();

    let consumer = harness.consumer(
        "inventory-queue",
        Dispatcher::new().on_event(|_: OrderCreated, _ctx| Ok(())),
    );
    assert!(consumer.poll_once().unwrap().unwrap().is_acked());
    assert_eq!(harness.broker.depth("inventory-queue"), 0);
}
