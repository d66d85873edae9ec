//! Error types for the exchange
//!
//! Every failure below the order feed is rolled back and then reported with
//! one of these variants. Nothing inside the settlement path retries; callers
//! use [`Error::is_retryable`] to decide whether resubmitting the order from
//! its origin is safe.

use std::fmt::Display;
use thiserror::Error;

/// Exchange error type
#[derive(Debug, Error)]
pub enum Error {
    /// The inbound message could not be decoded into a valid order
    #[error("Malformed order: {0}")]
    MalformedOrder(String),

    /// One of the settling parties has no account in the durable store
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// The order id was already persisted, settled or is resting in the book
    #[error("Duplicate order: {0}")]
    DuplicateOrder(String),

    /// A balance update touched no row after the account was verified
    #[error("Balance adjustment inconsistent: {0}")]
    BalanceAdjustmentInconsistent(String),

    /// A write was rejected or returned nothing; no partial state survives
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// The durable store could not be reached or the transaction timed out
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// No order book is registered for the symbol
    #[error("Market not found: {0}")]
    MarketNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the whole order may be safely resubmitted from its origin
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PersistenceFailure(_) | Error::StoreUnavailable(_))
    }

    /// Short machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedOrder(_) => "malformed_order",
            Error::AccountNotFound(_) => "account_not_found",
            Error::DuplicateOrder(_) => "duplicate_order",
            Error::BalanceAdjustmentInconsistent(_) => "balance_adjustment_inconsistent",
            Error::PersistenceFailure(_) => "persistence_failure",
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::MarketNotFound(_) => "market_not_found",
            Error::ConfigurationError(_) => "configuration_error",
            Error::Internal(_) => "internal_error",
            Error::Migration(_) => "migration_error",
            Error::Serialization(_) => "serialization_error",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait to add context to error results
pub trait ErrorExt<T> {
    /// Add context information to an error
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T> ErrorExt<T> for Result<T> {
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|e| {
            let context = context_fn().to_string();
            match e {
                Error::MalformedOrder(msg) => Error::MalformedOrder(format!("{}: {}", context, msg)),
                Error::AccountNotFound(msg) => Error::AccountNotFound(format!("{}: {}", context, msg)),
                Error::DuplicateOrder(msg) => Error::DuplicateOrder(format!("{}: {}", context, msg)),
                Error::BalanceAdjustmentInconsistent(msg) => {
                    Error::BalanceAdjustmentInconsistent(format!("{}: {}", context, msg))
                }
                Error::PersistenceFailure(msg) => Error::PersistenceFailure(format!("{}: {}", context, msg)),
                Error::StoreUnavailable(msg) => Error::StoreUnavailable(format!("{}: {}", context, msg)),
                Error::MarketNotFound(msg) => Error::MarketNotFound(format!("{}: {}", context, msg)),
                Error::ConfigurationError(msg) => Error::ConfigurationError(format!("{}: {}", context, msg)),
                Error::Internal(msg) => Error::Internal(format!("{}: {}", context, msg)),
                Error::Migration(e) => Error::Migration(e),
                Error::Serialization(e) => Error::Serialization(e),
            }
        })
    }
}

/// Classify driver errors: connectivity problems are `StoreUnavailable`,
/// everything the database itself rejected is a `PersistenceFailure`
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Error::StoreUnavailable(err.to_string()),
            _ => Error::PersistenceFailure(err.to_string()),
        }
    }
}
