//! HTTP surface of the exchange
//!
//! Orders posted here enter the same per-market feed as every other order
//! source. The read endpoints expose order book depth and the latest market
//! price for diagnostics.

pub mod api;
pub mod error;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Json, Router,
};
use market_data::MarketPricePublisher;
use matching_engine::MatchingEngine;
use settlement_service::OrderRouter;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::api::{health, market, order};

/// App state shared across handlers
pub struct AppState {
    /// Matching engine, read-only from here
    pub engine: Arc<MatchingEngine>,
    /// Feed entry for submitted orders
    pub router: Arc<OrderRouter>,
    /// Market price reads
    pub publisher: Arc<MarketPricePublisher>,
    /// When the state was built, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        engine: Arc<MatchingEngine>,
        router: Arc<OrderRouter>,
        publisher: Arc<MarketPricePublisher>,
    ) -> Self {
        Self {
            engine,
            router,
            publisher,
            started_at: Instant::now(),
        }
    }
}

/// API documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        order::submit_order,
        market::get_order_book,
        market::get_price,
        health::health_check,
    ),
    components(
        schemas(
            order::OrderAccepted,
            market::OrderBookData,
            market::PriceLevel,
            market_data::PriceUpdate,
            health::HealthStatus,
        )
    ),
    tags(
        (name = "order", description = "Order submission"),
        (name = "market", description = "Order book and market price"),
        (name = "system", description = "Service health")
    ),
    info(
        title = "Exchange API",
        version = "1.0.0",
        description = "Order feed entry and market diagnostics for the exchange"
    )
)]
pub struct ApiDoc;

/// Build the application with all routes and layers
pub fn app(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/orders", post(order::submit_order))
        .route("/markets/:symbol/order-book", get(market::get_order_book))
        .route("/markets/:symbol/price", get(market::get_price));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
