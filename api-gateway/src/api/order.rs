//! Order API handlers

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::response::ApiResponse;
use crate::error::ApiError;
use crate::AppState;

/// Order accepted into the feed
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderAccepted {
    /// Id of the queued order
    pub order_id: Uuid,
    /// Always `queued`; the outcome is decided by the market's worker
    pub status: String,
}

/// Submit an order message
///
/// The body is decoded exactly like a message from the order feed and
/// queued on its market's worker. Acceptance does not mean the order
/// rested or traded.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body(content = String, description = "Order message JSON", content_type = "application/json"),
    responses(
        (status = 202, description = "Order queued", body = OrderAccepted),
        (status = 400, description = "Malformed order message"),
        (status = 404, description = "Market not found")
    ),
    tag = "order"
)]
pub async fn submit_order(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, ApiResponse<OrderAccepted>), ApiError> {
    let order_id = state.router.dispatch(&body).await?;

    Ok((
        StatusCode::ACCEPTED,
        ApiResponse::new(OrderAccepted {
            order_id,
            status: "queued".to_string(),
        }),
    ))
}
