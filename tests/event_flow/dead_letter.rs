use std::time::Duration;

use pretty_assertions::assert_eq;
use xyz_events::broker::DeathReason;
use xyz_events::consumer::{handler_fn, Disposition, HandlerError, ProcessingError};
use xyz_events::envelope;
use xyz_events::orders::{publish_order_created, OrderCreated};
use xyz_events::topology::{RetryPolicy, Subscription, Topology, DEFAULT_DLQ_RETENTION};

use crate::support::{order, Harness};

#[test]
fn fifth_failure_moves_message_to_dlq() {
    let harness = Harness::new();
    let id = publish_order_created(&harness.publisher(), &order("o-1")).unwrap();
    let consumer = harness.consumer(
        "payments-queue",
        handler_fn(|_| Err(HandlerError::failed("card processor down"))),
    );

    for _ in 0..5 {
        let disposition = consumer.poll_once().unwrap().unwrap();
        assert!(matches!(
            disposition,
            Disposition::Nacked(ProcessingError::HandlerFailure(_))
        ));
    }
    assert!(consumer.poll_once().unwrap().is_none());

    assert_eq!(harness.broker.depth("payments-queue"), 0);
    let letters = harness.broker.dead_letters("payments-dlq").unwrap();
    assert_eq!(letters.len(), 1);

    let letter = &letters[0];
    assert_eq!(letter.message_id, id);
    let death = letter.last_death().unwrap();
    assert_eq!(death.queue, "payments-queue");
    assert_eq!(death.reason, DeathReason::Rejected);
    assert_eq!(death.delivery_count, 5);
    assert_eq!(
        death.last_error.as_deref(),
        Some("handler failed: card processor down")
    );

    // The payload is untouched.
    let event = envelope::decode(&letter.body().unwrap()).unwrap();
    assert_eq!(event.decode::<OrderCreated>().unwrap(), order("o-1"));

    // The other subscriber is unaffected.
    assert_eq!(harness.broker.depth("inventory-queue"), 1);
    assert_eq!(harness.broker.depth("inventory-dlq"), 0);
}

#[test]
fn dead_letter_export_is_json_with_base64_body() {
    let harness = Harness::new();
    harness
        .client
        .publish("xyz.events", "orders.created", &[0xff, 0xfe, 0x00])
        .unwrap();
    let consumer = harness.consumer("inventory-queue", handler_fn(|_| Ok(())));
    for _ in 0..5 {
        consumer.poll_once().unwrap();
    }

    let letters = harness.broker.dead_letters("inventory-dlq").unwrap();
    let exported = serde_json::to_value(&letters).unwrap();
    assert_eq!(exported[0]["body_base64"], "//4A");
    assert_eq!(exported[0]["routing_key"], "orders.created");
    assert_eq!(letters[0].body().unwrap(), vec![0xff, 0xfe, 0x00]);
}

#[test]
fn dead_letters_expire_after_retention() {
    let harness = Harness::new();
    publish_order_created(&harness.publisher(), &order("o-1")).unwrap();
    let consumer = harness.consumer(
        "inventory-queue",
        handler_fn(|_| Err(HandlerError::failed("x"))),
    );
    for _ in 0..5 {
        consumer.poll_once().unwrap();
    }
    assert_eq!(harness.broker.depth("inventory-dlq"), 1);

    harness.clock.advance(DEFAULT_DLQ_RETENTION - Duration::from_secs(60));
    assert_eq!(harness.broker.depth("inventory-dlq"), 1);
    harness.clock.advance(Duration::from_secs(60));
    assert_eq!(harness.broker.depth("inventory-dlq"), 0);
}

#[test]
fn queue_policy_sets_the_budget() {
    let harness = Harness::with_topology(
        Topology::standard().subscribe(
            Subscription::new("audit")
                .bind("#")
                .with_policy(RetryPolicy::default().with_max_delivery_count(2)),
        ),
    );
    publish_order_created(&harness.publisher(), &order("o-1")).unwrap();
    let consumer = harness.consumer("audit-queue", handler_fn(|_| Err(HandlerError::failed("x"))));

    consumer.poll_once().unwrap();
    consumer.poll_once().unwrap();

    assert_eq!(harness.broker.depth("audit-queue"), 0);
    assert_eq!(harness.broker.depth("audit-dlq"), 1);
}

#[test]
fn dead_letter_queue_is_not_redelivered_from() {
    let harness = Harness::new();
    publish_order_created(&harness.publisher(), &order("o-1")).unwrap();
    let consumer = harness.consumer(
        "inventory-queue",
        handler_fn(|_| Err(HandlerError::failed("x"))),
    );
    for _ in 0..5 {
        consumer.poll_once().unwrap();
    }

    // Reading the DLQ and failing again does not bounce the message anywhere.
    let dlq_reader = harness.consumer(
        "inventory-dlq",
        handler_fn(|_| Err(HandlerError::failed("x"))),
    );
    for _ in 0..10 {
        dlq_reader.poll_once().unwrap();
    }
    assert_eq!(harness.broker.depth("inventory-queue"), 0);
    assert_eq!(harness.broker.depth("inventory-dlq"), 1);
}
