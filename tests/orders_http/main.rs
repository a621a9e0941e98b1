//! HTTP order endpoint integration tests.
//!
//! Starts an axum server and exercises it with reqwest.

#![cfg(feature = "http")]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use xyz_events::broker::{BrokerClient, InMemoryBroker};
use xyz_events::envelope;
use xyz_events::orders::{http, OrderCreated};
use xyz_events::publisher::Publisher;
use xyz_events::topology::{TopicSpec, Topology};

fn broker_with_topology() -> InMemoryBroker {
    let broker = InMemoryBroker::new();
    let client = BrokerClient::connect(broker.connector()).unwrap();
    Topology::standard().declare(&client).unwrap();
    broker
}

fn publisher(broker: &InMemoryBroker) -> Arc<Publisher> {
    Arc::new(Publisher::connect(broker.connector(), TopicSpec::new("xyz.events")).unwrap())
}

/// Bind to port 0 and return the actual address.
async fn start_server(publisher: Arc<Publisher>) -> String {
    let app = http::router(publisher);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_check() {
    let broker = broker_with_topology();
    let base = start_server(publisher(&broker)).await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "ok": true, "topic": "xyz.events" }));
}

#[tokio::test]
async fn create_order_publishes_event() {
    let broker = broker_with_topology();
    let base = start_server(publisher(&broker)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/orders"))
        .json(&json!({ "order_id": "o-1", "sku": "SKU-123", "qty": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["order_id"], "o-1");

    let reader = BrokerClient::connect(broker.connector()).unwrap();
    for queue in ["inventory-queue", "payments-queue"] {
        let delivery = reader.receive(queue, Duration::ZERO).unwrap().unwrap();
        assert_eq!(delivery.message_id.to_string(), body["message_id"]);
        let order: OrderCreated = envelope::decode(&delivery.body).unwrap().decode().unwrap();
        assert_eq!(order, OrderCreated::new("SKU-123", 2).with_id("o-1"));
    }
}

#[tokio::test]
async fn order_id_is_generated_when_missing() {
    let broker = broker_with_topology();
    let base = start_server(publisher(&broker)).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/orders"))
        .json(&json!({ "sku": "SKU-9", "qty": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(!body["order_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_orders_are_unprocessable() {
    let broker = broker_with_topology();
    let base = start_server(publisher(&broker)).await;
    let client = reqwest::Client::new();

    for input in [
        json!({ "sku": "SKU-1", "qty": 0 }),
        json!({ "sku": "", "qty": 1 }),
        json!({ "qty": 1 }),
        json!({ "sku": "SKU-1", "qty": -3 }),
    ] {
        let resp = client
            .post(format!("{base}/orders"))
            .json(&input)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422, "input {input}");
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());
    }
    assert_eq!(broker.depth("inventory-queue"), 0);
}

#[tokio::test]
async fn broker_outage_is_service_unavailable() {
    let broker = broker_with_topology();
    let base = start_server(publisher(&broker)).await;
    broker.set_available(false);

    let resp = reqwest::Client::new()
        .post(format!("{base}/orders"))
        .json(&json!({ "sku": "SKU-1", "qty": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn topology_conflict_is_internal_error() {
    let broker = InMemoryBroker::new();
    let client = BrokerClient::connect(broker.connector()).unwrap();
    client.declare_topic(&TopicSpec::transient("xyz.events")).unwrap();
    let base = start_server(publisher(&broker)).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/orders"))
        .json(&json!({ "sku": "SKU-1", "qty": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
}
