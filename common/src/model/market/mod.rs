//! Market models and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Price;
#[cfg(feature = "utoipa")]
use crate::utoipa::ToSchema;

/// Market price record, appended once per settled trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MarketPrice {
    /// Market symbol
    pub symbol: String,
    /// Price of the trade that produced this record
    pub price: Price,
    /// Price recorded before this one, if any
    pub previous_price: Option<Price>,
    /// When the price changed
    pub recorded_at: DateTime<Utc>,
}

impl MarketPrice {
    pub fn new(symbol: impl Into<String>, price: Price, previous_price: Option<Price>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            previous_price,
            recorded_at: Utc::now(),
        }
    }

    /// Difference to the previous price, if there was one
    pub fn change(&self) -> Option<Price> {
        self.previous_price.map(|previous| self.price - previous)
    }
}
