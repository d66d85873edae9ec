//! Market data models

use chrono::{DateTime, Utc};
use common::decimal::{Price, Quantity};
use common::model::market::MarketPrice;
use common::model::order::Side;
use common::model::trade::{Trade, TradeId};
use serde::{Deserialize, Serialize};

#[cfg(feature = "utoipa")]
use utoipa::ToSchema;

/// New reference price for a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    /// Market symbol
    pub symbol: String,
    /// Price of the last settled trade
    pub price: Price,
    /// Price before that trade, if any
    pub previous_price: Option<Price>,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl From<&MarketPrice> for PriceUpdate {
    fn from(price: &MarketPrice) -> Self {
        Self {
            symbol: price.symbol.clone(),
            price: price.price,
            previous_price: price.previous_price,
            timestamp: price.recorded_at,
        }
    }
}

/// Trade message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TradeMessage {
    /// Trade ID assigned by the store
    pub id: TradeId,
    /// Market symbol
    pub symbol: String,
    /// Price
    pub price: Price,
    /// Quantity
    pub quantity: Quantity,
    /// Side that was the taker (initiated the match)
    pub taker_side: Side,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl From<&Trade> for TradeMessage {
    fn from(trade: &Trade) -> Self {
        Self {
            id: trade.id,
            symbol: trade.symbol.clone(),
            price: trade.price,
            quantity: trade.quantity,
            taker_side: trade.taker_side,
            timestamp: trade.created_at,
        }
    }
}

/// Message delivered to channel subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MarketDataMessage {
    Price(PriceUpdate),
    Trade(TradeMessage),
}
