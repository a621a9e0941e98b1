//! Order flow walkthrough.
//!
//! Publishes a few `OrderCreated` events to `xyz.events`. The inventory
//! service handles them. The payments service fails every time, so its copies
//! end up in `payments-dlq` after five attempts.
//!
//! `EVENTS_TOPIC` and `CONSUMER_QUEUE` change the topic and the inventory
//! queue name.
//!
//! Run with:
//! ```sh
//! RUST_LOG=xyz_events=debug cargo run --example order_flow
//! ```

use std::error::Error;
use std::thread;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xyz_events::consumer::{handler_fn, Consumer, Dispatcher, HandlerError};
use xyz_events::orders::{publish_order_created, OrderCreated};
use xyz_events::{BrokerClient, BrokerSettings, InMemoryBroker, Publisher, Subscription, Topology};

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "xyz_events=info,order_flow=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = BrokerSettings::from_env()?;
    info!(
        broker = %settings.redacted_url(),
        mode = %settings.connection_mode,
        "starting order flow"
    );

    let broker = InMemoryBroker::from_url(&settings.url)?;
    let admin = BrokerClient::connect(broker.connector())?;
    // CONSUMER_QUEUE renames the inventory side, e.g. `stock-queue`.
    let configured = settings.queue_or("inventory-queue");
    let inventory_sub =
        Subscription::new(configured.strip_suffix("-queue").unwrap_or(configured)).bind("orders.*");
    let inventory_queue = inventory_sub.queue_name();
    let topology = Topology::new(settings.topic_spec())
        .subscribe(inventory_sub)
        .subscribe(Subscription::new("payments").bind("orders.*"));
    topology.declare(&admin)?;

    let options = settings.consumer_options();

    let inventory = Dispatcher::new().on_event(|order: OrderCreated, ctx| {
        info!(
            order_id = %order.order_id,
            sku = %order.sku,
            qty = order.qty,
            attempt = ctx.delivery_count(),
            "reserving stock"
        );
        Ok(())
    });
    let inventory =
        Consumer::connect(broker.connector(), inventory_queue, inventory, options)?.spawn();

    let payments = handler_fn(|ctx| {
        Err(HandlerError::failed(format!(
            "payment gateway rejected attempt {}",
            ctx.delivery_count()
        )))
    });
    let payments =
        Consumer::connect(broker.connector(), "payments-queue", payments, options)?.spawn();

    let publisher = Publisher::with_mode(
        broker.connector(),
        topology.topic.clone(),
        settings.connection_mode,
    )?;
    for (sku, qty) in [("SKU-123", 2), ("SKU-456", 1), ("SKU-789", 5)] {
        let order = OrderCreated::new(sku, qty);
        let message_id = publish_order_created(&publisher, &order)?;
        info!(order_id = %order.order_id, %message_id, "order published");
    }

    thread::sleep(Duration::from_secs(1));

    let inventory_stats = inventory.stop();
    let payments_stats = payments.stop();
    publisher.close();
    info!(?inventory_stats, "inventory consumer stopped");
    info!(?payments_stats, "payments consumer stopped");

    let dead = broker.dead_letters("payments-dlq")?;
    println!("{}", serde_json::to_string_pretty(&dead)?);
    Ok(())
}
