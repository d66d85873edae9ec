mod order_book;
pub mod engine;

pub use engine::{BookSnapshot, MarketDepth, MatchDecision, MatchingEngine, Reservation};
pub use order_book::{AskSide, BidSide, Level, OrderBook, OrderBookSide};
