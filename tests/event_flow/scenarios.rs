//! The two end-to-end walkthroughs: a single `OrderCreated` delivery, and a
//! handler that never succeeds.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use xyz_events::consumer::{handler_fn, HandlerError};
use xyz_events::envelope::Event;
use xyz_events::topology::{Subscription, Topology, EVENTS_TOPIC};

use crate::support::Harness;

#[test]
fn exact_binding_receives_exactly_one_envelope() {
    let harness = Harness::with_topology(
        Topology::standard().subscribe(Subscription::new("fulfilment").bind("orders.created")),
    );
    let publisher = harness.publisher();
    assert_eq!(publisher.topic().name, EVENTS_TOPIC);

    let event = Event::from_data(
        "OrderCreated",
        &json!({"order_id": "o-1", "sku": "SKU-123", "qty": 2}),
    )
    .unwrap();
    publisher.publish_event("orders.created", &event).unwrap();

    let delivery = harness
        .client
        .receive("fulfilment-queue", Duration::ZERO)
        .unwrap()
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&delivery.body).unwrap();
    assert_eq!(
        body,
        json!({"type": "OrderCreated", "data": {"order_id": "o-1", "sku": "SKU-123", "qty": 2}})
    );
    assert!(harness
        .client
        .receive("fulfilment-queue", Duration::ZERO)
        .unwrap()
        .is_none());
}

#[test]
fn always_failing_handler_ends_in_dlq_after_five_attempts() {
    let harness = Harness::new();
    let publisher = harness.publisher();
    publisher
        .publish_event(
            "orders.created",
            &Event::from_data(
                "OrderCreated",
                &json!({"order_id": "o-1", "sku": "SKU-123", "qty": 2}),
            )
            .unwrap(),
        )
        .unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let consumer = harness.consumer(
        "inventory-queue",
        handler_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::failed("always"))
        }),
    );

    while consumer.poll_once().unwrap().is_some() {}

    assert_eq!(attempts.load(Ordering::SeqCst), 5);
    assert_eq!(harness.broker.depth("inventory-queue"), 0);
    assert_eq!(harness.broker.depth("inventory-dlq"), 1);
}
