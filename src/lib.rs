//! Single-pair exchange: limit order matching with atomic trade settlement
//!
//! This package only ties the workspace crates together for end-to-end
//! tests; the engine binary lives in `trading-engine`.

pub use common;
pub use market_data;
pub use matching_engine;
pub use settlement_service;
