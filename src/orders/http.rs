//! HTTP endpoint that creates orders by publishing `OrderCreated`.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `POST /orders`: body `{ "sku": "...", "qty": 2, "order_id": "optional" }`.
//!   Answers `201 { "order_id", "message_id" }` once the broker accepted the
//!   event, `422` for invalid input, `503` when the broker is unavailable and
//!   `500` for anything else.
//! - `GET /health`: returns `{ "ok": true, "topic": "..." }`.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use xyz_events::broker::InMemoryBroker;
//! use xyz_events::publisher::Publisher;
//! use xyz_events::topology::TopicSpec;
//!
//! let broker = InMemoryBroker::new();
//! let publisher = Arc::new(Publisher::connect(broker.connector(), TopicSpec::new("xyz.events"))?);
//!
//! xyz_events::orders::http::serve(publisher, "0.0.0.0:3000").await?;
//! ```

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{publish_order_created, OrderCreated};
use crate::publisher::{PublishError, Publisher};

/// Body of `POST /orders`.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub sku: String,
    pub qty: u32,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Build an axum `Router` that publishes orders through `publisher`.
pub fn router(publisher: Arc<Publisher>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/orders", post(create_order_handler))
        .with_state(publisher)
}

/// Serve the orders endpoint at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve(publisher: Arc<Publisher>, addr: &str) -> Result<(), std::io::Error> {
    let app = router(publisher);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "orders endpoint listening");
    axum::serve(listener, app).await
}

async fn health_handler(State(publisher): State<Arc<Publisher>>) -> impl IntoResponse {
    Json(json!({ "ok": true, "topic": publisher.topic().name }))
}

async fn create_order_handler(
    State(publisher): State<Arc<Publisher>>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
        }
    };

    let order = OrderCreated {
        order_id: request
            .order_id
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        sku: request.sku,
        qty: request.qty,
    };
    if let Err(reason) = order.validate() {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, reason);
    }

    // Publishing blocks until the broker confirms.
    let result = tokio::task::spawn_blocking(move || {
        let published = publish_order_created(&publisher, &order);
        (order, published)
    })
    .await;

    match result {
        Ok((order, Ok(message_id))) => {
            info!(order_id = %order.order_id, message_id = %message_id, "order created");
            (
                StatusCode::CREATED,
                Json(json!({
                    "order_id": order.order_id,
                    "message_id": message_id.to_string(),
                })),
            )
                .into_response()
        }
        Ok((order, Err(err @ PublishError::BrokerUnavailable(_)))) => {
            warn!(order_id = %order.order_id, error = %err, "order not published");
            error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        Ok((order, Err(err))) => {
            error!(order_id = %order.order_id, error = %err, "order not published");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        Err(err) => {
            error!(error = %err, "publish task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "publish task failed".to_string())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
