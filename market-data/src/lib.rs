//! Market price recording and distribution

mod models;
pub mod channel;
pub mod publisher;

pub use channel::{MarketDataChannel, Subscription, Topic};
pub use models::{MarketDataMessage, PriceUpdate, TradeMessage};
pub use publisher::MarketPricePublisher;
