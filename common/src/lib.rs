//! Common types and utilities for the exchange
//!
//! This library contains the domain models, error taxonomy and the durable
//! store adapter shared by the matching engine, the settlement service and
//! the market price publisher.

pub mod error;
pub mod model;
pub mod decimal;
pub mod db;

/// Re-export important types
pub use error::{Error, Result, ErrorExt};
pub use decimal::*;

// Re-export database types
pub use db::transaction::{DBTransaction, TransactionManager};

// Re-export utoipa for use in model ToSchema derives
#[cfg(feature = "utoipa")]
pub use utoipa;
