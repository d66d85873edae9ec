//! Order models and related types

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Amount, Price, Quantity};
use crate::error::Error;
#[cfg(feature = "utoipa")]
use crate::utoipa::ToSchema;

/// Largest accepted order quantity
pub const MAX_QUANTITY: Quantity = Quantity::from_parts(1_000_000_000, 0, 0, false, 0);

/// Largest accepted limit price
pub const MAX_PRICE: Price = Price::from_parts(1_000_000_000, 0, 0, false, 0);

/// Most fractional digits a quantity, price or amount can carry in the store
pub const MAX_SCALE: u32 = 10;

/// Order side (buy or sell)
///
/// Decodes from `"Buy"`/`"Sell"` in any letter case and from the integer
/// codes `0` (buy) and `1` (sell) used by older order producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side an order must be on to trade against this one
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("buy") {
            Ok(Side::Buy)
        } else if s.eq_ignore_ascii_case("sell") {
            Ok(Side::Sell)
        } else {
            Err(Error::MalformedOrder(format!("unknown side: {}", s)))
        }
    }
}

impl<'de> Deserialize<'de> for Side {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SideVisitor;

        impl<'de> Visitor<'de> for SideVisitor {
            type Value = Side;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"Buy\", \"Sell\", 0 or 1")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Side, E> {
                v.parse()
                    .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Side, E> {
                match v {
                    0 => Ok(Side::Buy),
                    1 => Ok(Side::Sell),
                    _ => Err(E::invalid_value(Unexpected::Unsigned(v), &self)),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Side, E> {
                match v {
                    0 => Ok(Side::Buy),
                    1 => Ok(Side::Sell),
                    _ => Err(E::invalid_value(Unexpected::Signed(v), &self)),
                }
            }
        }

        deserializer.deserialize_any(SideVisitor)
    }
}

/// Limit order as it arrives on the order feed
///
/// Orders are immutable once created. The wire format uses camelCase names
/// and also accepts the PascalCase names (`OrderId`, `Type`, ...) emitted by
/// the original order producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique order ID
    #[serde(rename = "orderId", alias = "OrderId", alias = "id")]
    pub id: Uuid,
    /// Owning account
    #[serde(alias = "UserId")]
    pub user_id: String,
    /// Market symbol (e.g., "HCN/HDO")
    #[serde(alias = "Symbol")]
    pub symbol: String,
    /// Order side (buy or sell)
    #[serde(alias = "Side", alias = "Type", alias = "type")]
    pub side: Side,
    /// Requested quantity of the asset
    #[serde(alias = "Quantity")]
    pub quantity: Quantity,
    /// Limit price in currency per unit of asset
    #[serde(alias = "Price")]
    pub price: Price,
}

impl Order {
    /// Create a new limit order with a fresh id
    pub fn new(
        user_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Quantity,
        price: Price,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
        }
    }

    /// Decode and validate one message from the order feed
    pub fn decode(message: &[u8]) -> Result<Self, Error> {
        if message.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::MalformedOrder("empty message".to_string()));
        }

        let order: Order = serde_json::from_slice(message)
            .map_err(|e| Error::MalformedOrder(e.to_string()))?;
        order.validate()?;
        Ok(order)
    }

    /// Check the shape invariants every order must satisfy
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.is_nil() {
            return Err(Error::MalformedOrder("order id must not be nil".to_string()));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::MalformedOrder(format!("order {} has no user id", self.id)));
        }
        if self.symbol.trim().is_empty() {
            return Err(Error::MalformedOrder(format!("order {} has no symbol", self.id)));
        }
        if self.quantity <= Quantity::ZERO {
            return Err(Error::MalformedOrder(format!(
                "order {} quantity must be positive, got {}",
                self.id, self.quantity
            )));
        }
        if self.price <= Price::ZERO {
            return Err(Error::MalformedOrder(format!(
                "order {} price must be positive, got {}",
                self.id, self.price
            )));
        }
        if self.quantity > MAX_QUANTITY {
            return Err(Error::MalformedOrder(format!(
                "order {} quantity {} exceeds {}",
                self.id, self.quantity, MAX_QUANTITY
            )));
        }
        if self.price > MAX_PRICE {
            return Err(Error::MalformedOrder(format!(
                "order {} price {} exceeds {}",
                self.id, self.price, MAX_PRICE
            )));
        }
        if self.quantity.scale() > MAX_SCALE || self.price.scale() > MAX_SCALE {
            return Err(Error::MalformedOrder(format!(
                "order {} has more than {} decimal places",
                self.id, MAX_SCALE
            )));
        }
        Ok(())
    }

    /// Currency value of this order's full quantity at `price`, rounded to
    /// the store's precision
    pub fn notional(&self, price: Price) -> Result<Amount, Error> {
        self.quantity
            .checked_mul(price)
            .map(|amount| amount.round_dp(MAX_SCALE))
            .ok_or_else(|| {
                Error::MalformedOrder(format!(
                    "order {} notional {} * {} overflows",
                    self.id, self.quantity, price
                ))
            })
    }
}

/// A resting order together with its arrival sequence in the book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    /// The resting order
    pub order: Order,
    /// Insertion sequence, used to break price ties (lower first)
    pub sequence: u64,
}

impl OrderBookEntry {
    pub fn new(order: Order, sequence: u64) -> Self {
        Self { order, sequence }
    }

    pub fn id(&self) -> Uuid {
        self.order.id
    }

    pub fn price(&self) -> Price {
        self.order.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::dec;

    #[test]
    fn test_decode_camel_case() {
        let message = br#"{"orderId":"6f1c2a5e-1f0b-4b7e-9a51-3f0d4a9b8c11","userId":"alice","symbol":"HCN/HDO","side":"Buy","quantity":"5","price":"10.5"}"#;
        let order = Order::decode(message).unwrap();
        assert_eq!(order.user_id, "alice");
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.quantity, dec!(5));
        assert_eq!(order.price, dec!(10.5));
    }

    #[test]
    fn test_decode_legacy_pascal_case_with_integer_side() {
        let message = br#"{"OrderId":"6f1c2a5e-1f0b-4b7e-9a51-3f0d4a9b8c11","UserId":"bob","Symbol":"HCN","Type":1,"Quantity":3,"Price":20}"#;
        let order = Order::decode(message).unwrap();
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.symbol, "HCN");
        assert_eq!(order.price, dec!(20));
    }

    #[test]
    fn test_decode_rejects_empty_and_garbage() {
        assert!(matches!(Order::decode(b""), Err(Error::MalformedOrder(_))));
        assert!(matches!(Order::decode(b"  \n"), Err(Error::MalformedOrder(_))));
        assert!(matches!(Order::decode(b"not json"), Err(Error::MalformedOrder(_))));
        assert!(matches!(
            Order::decode(br#"{"orderId":"6f1c2a5e-1f0b-4b7e-9a51-3f0d4a9b8c11","userId":"a","symbol":"HCN","side":"Hold","quantity":1,"price":1}"#),
            Err(Error::MalformedOrder(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_positive_values() {
        let mut order = Order::new("alice", "HCN/HDO", Side::Buy, dec!(1), dec!(10));
        assert!(order.validate().is_ok());

        order.quantity = dec!(0);
        assert!(matches!(order.validate(), Err(Error::MalformedOrder(_))));

        order.quantity = dec!(1);
        order.price = dec!(-1);
        assert!(matches!(order.validate(), Err(Error::MalformedOrder(_))));

        order.price = dec!(1);
        order.user_id = "  ".to_string();
        assert!(matches!(order.validate(), Err(Error::MalformedOrder(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_values() {
        let mut order = Order::new("alice", "HCN/HDO", Side::Sell, MAX_QUANTITY, MAX_PRICE);
        assert!(order.validate().is_ok());

        order.quantity = Quantity::MAX;
        assert!(matches!(order.validate(), Err(Error::MalformedOrder(_))));

        order.quantity = dec!(1);
        order.price = MAX_PRICE + dec!(1);
        assert!(matches!(order.validate(), Err(Error::MalformedOrder(_))));
    }

    #[test]
    fn test_validate_rejects_excess_precision() {
        let mut order = Order::new("alice", "HCN/HDO", Side::Buy, dec!(0.0000000001), dec!(10));
        assert!(order.validate().is_ok());

        order.quantity = dec!(0.00000000001);
        assert!(matches!(order.validate(), Err(Error::MalformedOrder(_))));

        order.quantity = dec!(1);
        order.price = dec!(10.00000000005);
        assert!(matches!(order.validate(), Err(Error::MalformedOrder(_))));
    }

    #[test]
    fn test_notional() {
        let order = Order::new("alice", "HCN/HDO", Side::Buy, dec!(0.0000000003), dec!(0.5));
        assert_eq!(order.notional(dec!(0.5)).unwrap(), dec!(0.0000000002));

        let order = Order::new("alice", "HCN/HDO", Side::Buy, MAX_QUANTITY, MAX_PRICE);
        assert_eq!(order.notional(MAX_PRICE).unwrap(), dec!(1000000000000000000));

        let huge = Order::new("bob", "HCN/HDO", Side::Sell, Quantity::MAX, dec!(1));
        assert!(matches!(huge.notional(dec!(2)), Err(Error::MalformedOrder(_))));
    }
}
