//! Post-commit notification hook.
//!
//! Fire and forget: by the time this runs the order is already durable, so
//! a failed publish is logged and dropped, never propagated.

use tracing::{debug, warn};

use crate::domain::order::Order;

pub const ORDER_PLACED_SUBJECT: &str = "orders.placed";

/// Publish an order-placed notification for downstream consumers (e.g. the
/// operator messaging service).
pub async fn order_placed(client: &async_nats::Client, order: &Order) {
    let payload = match serde_json::to_vec(order) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "could not encode order notification");
            return;
        }
    };
    match client
        .publish(ORDER_PLACED_SUBJECT.to_string(), payload.into())
        .await
    {
        Ok(()) => debug!(order_number = %order.number, "order notification published"),
        Err(e) => {
            warn!(error = %e, order_number = %order.number, "order notification failed");
        }
    }
}
