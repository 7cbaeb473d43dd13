//! HTTP surface: the checkout operation and order lookup.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use validator::Validate;

use crate::checkout::{place_order, CheckoutError, CheckoutRequest};
use crate::domain::cart::{AttributeSelection, CartLine, SelectedAttribute};
use crate::domain::order::ShippingInfo;
use crate::notify;
use crate::store::{CheckoutStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CheckoutStore>,
    pub nats: Option<async_nats::Client>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders/:id", get(get_order))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "storefront-checkout"}))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPayload {
    pub shipping: Option<ShippingInfo>,
    pub lines: Option<Vec<CheckoutLine>>,
    /// Buyer-declared total; required for shape, but the persisted total is
    /// recomputed from authoritative prices.
    pub total: Option<i64>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[serde(default)]
    pub selected_attributes: Vec<SelectedAttribute>,
    /// Display-time fields as shown by the storefront; echoed, not trusted.
    pub price: Option<i64>,
    pub name: Option<String>,
    pub image: Option<String>,
}

async fn checkout(State(state): State<AppState>, Json(payload): Json<CheckoutPayload>) -> Response {
    let (Some(shipping), Some(lines), Some(_declared_total)) =
        (payload.shipping, payload.lines, payload.total)
    else {
        return bad_request("shipping, lines and total are required");
    };
    if let Err(e) = shipping.validate() {
        return bad_request(format!("invalid shipping details: {e}"));
    }
    if lines.is_empty() {
        return bad_request("cart is empty");
    }
    for line in &lines {
        if let Err(e) = line.validate() {
            return bad_request(format!("invalid cart line: {e}"));
        }
    }

    let cart_lines: Vec<CartLine> = lines
        .into_iter()
        .map(|l| CartLine {
            product_id: l.product_id,
            quantity: l.quantity,
            selection: AttributeSelection::new(l.selected_attributes),
            display_price: l.price,
            display_name: l.name,
            display_image: l.image,
        })
        .collect();

    let request = CheckoutRequest {
        lines: cart_lines,
        shipping,
        customer_id: payload.customer_id,
    };

    match place_order(state.store.as_ref(), request).await {
        Ok(order) => {
            if let Some(client) = state.nats.clone() {
                let order = order.clone();
                tokio::spawn(async move { notify::order_placed(&client, &order).await });
            }
            (StatusCode::OK, Json(order)).into_response()
        }
        Err(err) => checkout_error_response(err),
    }
}

async fn get_order(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.get_order(id).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(StoreError::OrderNotFound) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "order not found")
        }
        Err(e) => {
            tracing::error!(error = %e, "order lookup failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "unexpected error",
            )
        }
    }
}

/// Stock rejections are expected, buyer-correctable outcomes; everything
/// else is a 500 the caller must treat as indeterminate.
fn checkout_error_response(err: CheckoutError) -> Response {
    match err {
        CheckoutError::Stock(report) => {
            let items: Vec<serde_json::Value> = report
                .issues
                .iter()
                .map(|i| {
                    json!({
                        "productId": i.product_id,
                        "name": i.name,
                        "message": i.message,
                    })
                })
                .collect();
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"type": "STOCK_ERROR", "items": items})),
            )
                .into_response()
        }
        CheckoutError::Persistence { .. } => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "persistence_error",
            "order could not be completed",
        ),
        CheckoutError::Store(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "unexpected error",
        ),
    }
}

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"error": code, "message": message.into()})),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "bad_request", message)
}
