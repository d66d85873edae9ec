//! Market API handlers
//!
//! Read-only views of one market: aggregated order book depth and the price
//! of its last settled trade.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use common::error::Error;
use market_data::PriceUpdate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::response::ApiResponse;
use crate::error::ApiError;
use crate::AppState;

const MAX_DEPTH: usize = 500;

/// Order book query parameters
#[derive(Debug, Deserialize)]
pub struct OrderBookQuery {
    /// Number of price levels per side
    #[serde(default = "default_depth")]
    pub depth: usize,
}

fn default_depth() -> usize {
    10
}

/// Total resting quantity at one price
#[derive(Debug, Serialize, ToSchema)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Order book data structure
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderBookData {
    /// Market symbol
    pub symbol: String,
    /// Bids, best first
    pub bids: Vec<PriceLevel>,
    /// Asks, best first
    pub asks: Vec<PriceLevel>,
}

fn levels(levels: Vec<(Decimal, Decimal)>) -> Vec<PriceLevel> {
    levels
        .into_iter()
        .map(|(price, quantity)| PriceLevel { price, quantity })
        .collect()
}

/// Get order book
#[utoipa::path(
    get,
    path = "/api/v1/markets/{symbol}/order-book",
    params(
        ("symbol" = String, Path, description = "Market symbol, URL encoded"),
        ("depth" = Option<usize>, Query, description = "Price levels per side")
    ),
    responses(
        (status = 200, description = "Order book retrieved successfully", body = OrderBookData),
        (status = 400, description = "Depth out of range"),
        (status = 404, description = "Market not found")
    ),
    tag = "market"
)]
pub async fn get_order_book(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<OrderBookQuery>,
) -> Result<ApiResponse<OrderBookData>, ApiError> {
    if query.depth == 0 || query.depth > MAX_DEPTH {
        return Err(ApiError::BadRequest(format!(
            "depth must be between 1 and {}",
            MAX_DEPTH
        )));
    }

    let depth = state.engine.market_depth(&symbol, query.depth)?;

    Ok(ApiResponse::new(OrderBookData {
        symbol: depth.symbol,
        bids: levels(depth.bids),
        asks: levels(depth.asks),
    }))
}

/// Get the latest market price
///
/// `data` is null until the market's first trade settles.
#[utoipa::path(
    get,
    path = "/api/v1/markets/{symbol}/price",
    params(
        ("symbol" = String, Path, description = "Market symbol, URL encoded")
    ),
    responses(
        (status = 200, description = "Latest price retrieved successfully", body = PriceUpdate),
        (status = 404, description = "Market not found"),
        (status = 503, description = "Store unavailable")
    ),
    tag = "market"
)]
pub async fn get_price(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<ApiResponse<Option<PriceUpdate>>, ApiError> {
    if !state.engine.has_market(&symbol) {
        return Err(Error::MarketNotFound(format!("Market not found: {}", symbol)).into());
    }

    let latest = state.publisher.latest(&symbol).await?;
    Ok(ApiResponse::new(latest.as_ref().map(PriceUpdate::from)))
}
