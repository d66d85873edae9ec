//! Settlement of matched orders and routing of the order feed

pub mod config;
pub mod coordinator;
pub mod processor;
pub mod router;

pub use config::{EngineConfig, StoreKind};
pub use coordinator::{settlement_adjustments, Settlement, SettlementCoordinator};
pub use processor::{OrderOutcome, OrderProcessor, Recovery};
pub use router::{FeedStats, OrderRouter, ProcessedOrder};
