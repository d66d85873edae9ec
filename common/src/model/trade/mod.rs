//! Trade models and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Amount, Price, Quantity};
use crate::error::Result;
use crate::model::order::{Order, Side};
#[cfg(feature = "utoipa")]
use crate::utoipa::ToSchema;

/// Store-generated trade identifier
pub type TradeId = i64;

/// A settled exchange between a taker and a resting maker order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Identifier assigned by the durable store
    pub id: TradeId,
    /// Market symbol (e.g., "HCN/HDO")
    pub symbol: String,
    /// Execution price (always the maker's limit price)
    pub price: Price,
    /// Quantity of the asset exchanged
    pub quantity: Quantity,
    /// Currency moved from buyer to seller (price * quantity)
    pub amount: Amount,
    /// Buying account
    pub buyer_id: String,
    /// Selling account
    pub seller_id: String,
    /// Incoming order that triggered the match
    pub taker_order_id: Uuid,
    /// Resting order it matched against
    pub maker_order_id: Uuid,
    /// Side of the taker
    pub taker_side: Side,
    /// Timestamp when the trade was recorded
    pub created_at: DateTime<Utc>,
}

/// Trade that has not yet been assigned an id by the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrade {
    pub symbol: String,
    pub price: Price,
    pub quantity: Quantity,
    pub amount: Amount,
    pub buyer_id: String,
    pub seller_id: String,
    pub taker_order_id: Uuid,
    pub maker_order_id: Uuid,
    pub taker_side: Side,
    pub created_at: DateTime<Utc>,
}

impl NewTrade {
    /// Build the trade implied by a taker matching a maker.
    ///
    /// Execution happens at the maker's price for the taker's full quantity.
    /// Fails if the resulting amount does not fit a decimal.
    pub fn from_match(taker: &Order, maker: &Order) -> Result<Self> {
        let (buyer, seller) = match taker.side {
            Side::Buy => (taker, maker),
            Side::Sell => (maker, taker),
        };
        let price = maker.price;
        let quantity = taker.quantity;
        let amount = taker.notional(price)?;

        Ok(Self {
            symbol: taker.symbol.clone(),
            price,
            quantity,
            amount,
            buyer_id: buyer.user_id.clone(),
            seller_id: seller.user_id.clone(),
            taker_order_id: taker.id,
            maker_order_id: maker.id,
            taker_side: taker.side,
            created_at: Utc::now(),
        })
    }

    /// Attach the store-generated id
    pub fn with_id(self, id: TradeId) -> Trade {
        Trade {
            id,
            symbol: self.symbol,
            price: self.price,
            quantity: self.quantity,
            amount: self.amount,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            taker_order_id: self.taker_order_id,
            maker_order_id: self.maker_order_id,
            taker_side: self.taker_side,
            created_at: self.created_at,
        }
    }
}
