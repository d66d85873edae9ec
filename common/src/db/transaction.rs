//! Transaction handling for the durable store
//!
//! A settlement runs every read and write through one [`DBTransaction`]
//! obtained from a [`TransactionManager`]. Either the whole transaction is
//! committed or none of its writes become visible. The enum dispatches to the
//! PostgreSQL implementation or to the in-memory store used by tests and the
//! demo mode.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::memory::InMemoryTransaction;
use crate::db::queries;
use crate::error::Result;
use crate::model::account::{Account, BalanceAdjustment};
use crate::model::market::MarketPrice;
use crate::model::order::{Order, OrderBookEntry};
use crate::model::trade::{NewTrade, TradeId};

/// Transaction enum that can be either PostgreSQL or in-memory
pub enum DBTransaction {
    /// PostgreSQL transaction
    Postgres(PgTransaction),
    /// In-memory transaction
    InMemory(InMemoryTransaction),
}

/// Transaction interface methods
impl DBTransaction {
    /// Whether an account exists for `user_id`
    pub async fn account_exists(&mut self, user_id: &str) -> Result<bool> {
        match self {
            DBTransaction::Postgres(tx) => tx.account_exists(user_id).await,
            DBTransaction::InMemory(tx) => tx.account_exists(user_id).await,
        }
    }

    /// Whether an order record with this id was already persisted
    pub async fn order_exists(&mut self, order_id: Uuid) -> Result<bool> {
        match self {
            DBTransaction::Postgres(tx) => tx.order_exists(order_id).await,
            DBTransaction::InMemory(tx) => tx.order_exists(order_id).await,
        }
    }

    /// Persist an order record; fails with `DuplicateOrder` if the id exists
    pub async fn insert_order(&mut self, order: &Order) -> Result<()> {
        match self {
            DBTransaction::Postgres(tx) => tx.insert_order(order).await,
            DBTransaction::InMemory(tx) => tx.insert_order(order).await,
        }
    }

    /// Apply one balance adjustment and return the affected row count
    pub async fn adjust_balance(&mut self, adjustment: &BalanceAdjustment) -> Result<u64> {
        match self {
            DBTransaction::Postgres(tx) => tx.adjust_balance(adjustment).await,
            DBTransaction::InMemory(tx) => tx.adjust_balance(adjustment).await,
        }
    }

    /// Persist a trade, returning the generated id if one was produced
    pub async fn insert_trade(&mut self, trade: &NewTrade) -> Result<Option<TradeId>> {
        match self {
            DBTransaction::Postgres(tx) => tx.insert_trade(trade).await,
            DBTransaction::InMemory(tx) => tx.insert_trade(trade).await,
        }
    }

    /// Append a market price record
    pub async fn insert_market_price(&mut self, price: &MarketPrice) -> Result<()> {
        match self {
            DBTransaction::Postgres(tx) => tx.insert_market_price(price).await,
            DBTransaction::InMemory(tx) => tx.insert_market_price(price).await,
        }
    }

    /// Most recent market price visible to this transaction
    pub async fn latest_market_price(&mut self, symbol: &str) -> Result<Option<MarketPrice>> {
        match self {
            DBTransaction::Postgres(tx) => tx.latest_market_price(symbol).await,
            DBTransaction::InMemory(tx) => tx.latest_market_price(symbol).await,
        }
    }

    /// Commit the transaction
    pub async fn commit(self) -> Result<()> {
        match self {
            DBTransaction::Postgres(tx) => tx.commit().await,
            DBTransaction::InMemory(tx) => tx.commit().await,
        }
    }

    /// Rollback the transaction
    pub async fn rollback(self) -> Result<()> {
        match self {
            DBTransaction::Postgres(tx) => tx.rollback().await,
            DBTransaction::InMemory(tx) => tx.rollback().await,
        }
    }
}

/// A PostgreSQL transaction implementation
pub struct PgTransaction {
    tx: SqlxTransaction<'static, Postgres>,
}

impl PgTransaction {
    /// Create a new PgTransaction
    pub fn new(tx: SqlxTransaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    pub async fn account_exists(&mut self, user_id: &str) -> Result<bool> {
        queries::account_exists(&mut *self.tx, user_id).await
    }

    pub async fn order_exists(&mut self, order_id: Uuid) -> Result<bool> {
        queries::order_exists(&mut *self.tx, order_id).await
    }

    pub async fn insert_order(&mut self, order: &Order) -> Result<()> {
        queries::insert_order(&mut *self.tx, order).await
    }

    pub async fn adjust_balance(&mut self, adjustment: &BalanceAdjustment) -> Result<u64> {
        queries::adjust_balance(&mut *self.tx, adjustment).await
    }

    pub async fn insert_trade(&mut self, trade: &NewTrade) -> Result<Option<TradeId>> {
        queries::insert_trade(&mut *self.tx, trade).await
    }

    pub async fn insert_market_price(&mut self, price: &MarketPrice) -> Result<()> {
        queries::insert_market_price(&mut *self.tx, price).await
    }

    pub async fn latest_market_price(&mut self, symbol: &str) -> Result<Option<MarketPrice>> {
        queries::latest_market_price(&mut *self.tx, symbol).await
    }

    /// Commit the transaction
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Rollback the transaction
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Transaction manager trait for creating and managing transactions
///
/// Besides opening transactions it exposes the few reads that happen
/// outside of a settlement, and the order book snapshots used for recovery.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Begin a new transaction
    async fn begin_transaction(&self) -> Result<DBTransaction>;

    /// Most recent committed market price for `symbol`
    async fn latest_market_price(&self, symbol: &str) -> Result<Option<MarketPrice>>;

    /// Whether the order was persisted as a taker or consumed as a maker
    async fn order_settled(&self, order_id: Uuid) -> Result<bool>;

    /// Read an account with its balances
    async fn get_account(&self, user_id: &str) -> Result<Option<Account>>;

    /// Replace the persisted snapshot of a symbol's resting orders
    async fn save_order_book(&self, symbol: &str, entries: &[OrderBookEntry]) -> Result<()>;

    /// Load the last persisted snapshot, empty if none exists
    async fn load_order_book(&self, symbol: &str) -> Result<Vec<OrderBookEntry>>;
}

/// A PostgreSQL transaction manager implementation
#[derive(Clone)]
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    /// Create a new PgTransactionManager
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    async fn begin_transaction(&self) -> Result<DBTransaction> {
        let tx = self.pool.begin().await?;
        Ok(DBTransaction::Postgres(PgTransaction::new(tx)))
    }

    async fn latest_market_price(&self, symbol: &str) -> Result<Option<MarketPrice>> {
        queries::latest_market_price(&self.pool, symbol).await
    }

    async fn order_settled(&self, order_id: Uuid) -> Result<bool> {
        queries::order_settled(&self.pool, order_id).await
    }

    async fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        queries::get_account(&self.pool, user_id).await
    }

    async fn save_order_book(&self, symbol: &str, entries: &[OrderBookEntry]) -> Result<()> {
        queries::save_order_book(&self.pool, symbol, entries).await
    }

    async fn load_order_book(&self, symbol: &str) -> Result<Vec<OrderBookEntry>> {
        queries::load_order_book(&self.pool, symbol).await
    }
}
