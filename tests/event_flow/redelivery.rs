use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use xyz_events::broker::BrokerClient;
use xyz_events::consumer::{handler_fn, HandlerError};
use xyz_events::orders::publish_order_created;
use xyz_events::topology::DEFAULT_VISIBILITY_TIMEOUT;

use crate::support::{order, Harness};

#[test]
fn nacked_message_comes_back_with_higher_count() {
    let harness = Harness::new();
    publish_order_created(&harness.publisher(), &order("o-1")).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let consumer = harness.consumer(
        "inventory-queue",
        handler_fn(move |ctx| {
            log.lock().unwrap().push(ctx.delivery_count());
            if ctx.is_redelivery() {
                Ok(())
            } else {
                Err(HandlerError::failed("warehouse offline"))
            }
        }),
    );

    assert!(!consumer.poll_once().unwrap().unwrap().is_acked());
    assert!(consumer.poll_once().unwrap().unwrap().is_acked());

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    assert_eq!(harness.broker.depth("inventory-queue"), 0);
}

#[test]
fn crashed_consumer_message_is_redelivered_after_visibility_timeout() {
    let harness = Harness::new();
    let publisher = harness.publisher();
    let id = publish_order_created(&publisher, &order("o-1")).unwrap();

    // A consumer takes the message and dies without acking.
    {
        let crashed = BrokerClient::connect(harness.broker.connector()).unwrap();
        let delivery = crashed
            .receive("inventory-queue", Duration::ZERO)
            .unwrap()
            .unwrap();
        assert_eq!(delivery.delivery_count, 1);
    }

    let counts = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&counts);
    let consumer = harness.consumer(
        "inventory-queue",
        handler_fn(move |ctx| {
            log.lock().unwrap().push((ctx.message_id(), ctx.delivery_count()));
            Ok(())
        }),
    );

    assert!(consumer.poll_once().unwrap().is_none());
    harness
        .clock
        .advance(DEFAULT_VISIBILITY_TIMEOUT - Duration::from_secs(1));
    assert!(consumer.poll_once().unwrap().is_none());

    harness.clock.advance(Duration::from_secs(1));
    assert!(consumer.poll_once().unwrap().unwrap().is_acked());
    assert_eq!(*counts.lock().unwrap(), vec![(id, 2)]);
}

#[test]
fn competing_consumers_split_the_queue() {
    let harness = Harness::new();
    let publisher = harness.publisher();
    publish_order_created(&publisher, &order("o-1")).unwrap();
    publish_order_created(&publisher, &order("o-2")).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let first_log = Arc::clone(&seen);
    let second_log = Arc::clone(&seen);
    let first = harness.consumer(
        "inventory-queue",
        handler_fn(move |ctx| {
            let order_id = ctx.data::<serde_json::Value>()?["order_id"].clone();
            first_log.lock().unwrap().push(("first", order_id));
            Ok(())
        }),
    );
    let second = harness.consumer(
        "inventory-queue",
        handler_fn(move |ctx| {
            let order_id = ctx.data::<serde_json::Value>()?["order_id"].clone();
            second_log.lock().unwrap().push(("second", order_id));
            Ok(())
        }),
    );

    assert!(first.poll_once().unwrap().unwrap().is_acked());
    assert!(second.poll_once().unwrap().unwrap().is_acked());
    assert!(first.poll_once().unwrap().is_none());

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("first", serde_json::json!("o-1")),
            ("second", serde_json::json!("o-2")),
        ]
    );
}

#[test]
fn redelivery_goes_behind_newer_messages() {
    let harness = Harness::new();
    let publisher = harness.publisher();
    publish_order_created(&publisher, &order("o-1")).unwrap();
    publish_order_created(&publisher, &order("o-2")).unwrap();

    let first = harness
        .client
        .receive("inventory-queue", Duration::ZERO)
        .unwrap()
        .unwrap();
    harness.client.nack(&first, "try later").unwrap();

    let next = harness
        .client
        .receive("inventory-queue", Duration::ZERO)
        .unwrap()
        .unwrap();
    assert_ne!(next.message_id, first.message_id);
    let again = harness
        .client
        .receive("inventory-queue", Duration::ZERO)
        .unwrap()
        .unwrap();
    assert_eq!(again.message_id, first.message_id);
    assert_eq!(again.delivery_count, 2);
}
