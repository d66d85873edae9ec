//! In-memory durable store
//!
//! Used by the demo mode and by tests. A transaction holds the store lock for
//! its whole lifetime and works on a private copy of the state, which replaces
//! the shared state only on commit. Dropping or rolling back a transaction
//! therefore leaves no trace.
//!
//! Faults can be injected at named points to exercise the abort paths of a
//! settlement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::db::transaction::{DBTransaction, TransactionManager};
use crate::decimal::Decimal;
use crate::error::{Error, Result};
use crate::model::account::{Account, BalanceAdjustment, BalanceField};
use crate::model::market::MarketPrice;
use crate::model::order::{Order, OrderBookEntry};
use crate::model::trade::{NewTrade, Trade, TradeId};

/// Place in a transaction where a fault can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    /// Opening the transaction fails as if the store were unreachable
    BeginTransaction,
    /// The order insert is rejected by the store
    InsertOrder,
    /// A balance update finds no row, as if the account disappeared
    AdjustBalance,
    /// The market price insert is rejected by the store
    InsertMarketPrice,
    /// The trade insert returns no id
    InsertTrade,
    /// The commit is rejected by the store
    Commit,
}

#[derive(Debug, Default)]
struct FaultPlan {
    pending: Vec<FailurePoint>,
    commit_delay: Option<Duration>,
    post_commit_delay: Option<Duration>,
}

impl FaultPlan {
    fn take(&mut self, point: FailurePoint) -> bool {
        match self.pending.iter().position(|p| *p == point) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }
}

#[derive(Clone, Default)]
struct Faults(Arc<Mutex<FaultPlan>>);

impl Faults {
    fn lock(&self) -> std::sync::MutexGuard<'_, FaultPlan> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn trip(&self, point: FailurePoint) -> bool {
        self.lock().take(point)
    }
}

/// Complete contents of the in-memory store
#[derive(Debug, Clone, Default)]
pub struct InMemoryState {
    accounts: HashMap<String, Account>,
    orders: HashMap<Uuid, Order>,
    trades: Vec<Trade>,
    market_prices: Vec<MarketPrice>,
    order_books: HashMap<String, Vec<OrderBookEntry>>,
    next_trade_id: TradeId,
}

impl InMemoryState {
    fn order_settled(&self, order_id: Uuid) -> bool {
        self.orders.contains_key(&order_id)
            || self.trades.iter().any(|t| t.maker_order_id == order_id)
    }

    fn latest_market_price(&self, symbol: &str) -> Option<MarketPrice> {
        // Records are appended in commit order, so the last match is the newest
        self.market_prices
            .iter()
            .rev()
            .find(|p| p.symbol == symbol)
            .cloned()
    }
}

/// In-memory transaction
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<InMemoryState>,
    working: InMemoryState,
    faults: Faults,
}

impl InMemoryTransaction {
    fn new(guard: OwnedMutexGuard<InMemoryState>, faults: Faults) -> Self {
        let working = guard.clone();
        Self {
            guard,
            working,
            faults,
        }
    }

    pub async fn account_exists(&mut self, user_id: &str) -> Result<bool> {
        Ok(self.working.accounts.contains_key(user_id))
    }

    pub async fn order_exists(&mut self, order_id: Uuid) -> Result<bool> {
        Ok(self.working.orders.contains_key(&order_id))
    }

    pub async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.faults.trip(FailurePoint::InsertOrder) {
            return Err(Error::PersistenceFailure(format!(
                "injected failure inserting order {}",
                order.id
            )));
        }
        if self.working.orders.contains_key(&order.id) {
            return Err(Error::DuplicateOrder(order.id.to_string()));
        }
        if !self.working.accounts.contains_key(&order.user_id) {
            return Err(Error::PersistenceFailure(format!(
                "order {} references unknown account {}",
                order.id, order.user_id
            )));
        }

        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    pub async fn adjust_balance(&mut self, adjustment: &BalanceAdjustment) -> Result<u64> {
        if self.faults.trip(FailurePoint::AdjustBalance) {
            return Ok(0);
        }

        match self.working.accounts.get_mut(&adjustment.user_id) {
            Some(account) => {
                account.apply(adjustment.field, adjustment.delta)?;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    pub async fn insert_trade(&mut self, trade: &NewTrade) -> Result<Option<TradeId>> {
        if self.faults.trip(FailurePoint::InsertTrade) {
            return Ok(None);
        }

        let conflict = self.working.trades.iter().any(|t| {
            t.taker_order_id == trade.taker_order_id || t.maker_order_id == trade.maker_order_id
        });
        if conflict {
            return Ok(None);
        }

        self.working.next_trade_id += 1;
        let id = self.working.next_trade_id;
        self.working.trades.push(trade.clone().with_id(id));
        Ok(Some(id))
    }

    pub async fn insert_market_price(&mut self, price: &MarketPrice) -> Result<()> {
        if self.faults.trip(FailurePoint::InsertMarketPrice) {
            return Err(Error::PersistenceFailure(format!(
                "injected failure recording market price for {}",
                price.symbol
            )));
        }

        self.working.market_prices.push(price.clone());
        Ok(())
    }

    pub async fn latest_market_price(&mut self, symbol: &str) -> Result<Option<MarketPrice>> {
        Ok(self.working.latest_market_price(symbol))
    }

    /// Publish the working copy as the new store state
    pub async fn commit(mut self) -> Result<()> {
        let delay = self.faults.lock().commit_delay.take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults.trip(FailurePoint::Commit) {
            return Err(Error::PersistenceFailure("injected commit failure".to_string()));
        }

        *self.guard = self.working;

        let delay = self.faults.lock().post_commit_delay.take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Discard the working copy
    pub async fn rollback(self) -> Result<()> {
        debug!("Rolling back in-memory transaction");
        Ok(())
    }
}

/// In-memory transaction manager
#[derive(Clone, Default)]
pub struct InMemoryTransactionManager {
    state: Arc<AsyncMutex<InMemoryState>>,
    faults: Faults,
}

impl InMemoryTransactionManager {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite an account
    pub async fn insert_account(&self, account: Account) {
        let mut state = self.state.lock().await;
        state.accounts.insert(account.user_id.clone(), account);
    }

    /// Make the next transaction fail at `point`
    pub fn fail_once(&self, point: FailurePoint) {
        self.faults.lock().pending.push(point);
    }

    /// Make the next commit wait for `delay` before applying its writes
    pub fn delay_next_commit(&self, delay: Duration) {
        self.faults.lock().commit_delay = Some(delay);
    }

    /// Make the next commit apply its writes, then wait for `delay` before
    /// reporting success, as if the acknowledgement were slow to arrive
    pub fn delay_after_next_commit(&self, delay: Duration) {
        self.faults.lock().post_commit_delay = Some(delay);
    }

    pub async fn accounts(&self) -> Vec<Account> {
        self.state.lock().await.accounts.values().cloned().collect()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.values().cloned().collect()
    }

    pub async fn trades(&self) -> Vec<Trade> {
        self.state.lock().await.trades.clone()
    }

    pub async fn market_prices(&self, symbol: &str) -> Vec<MarketPrice> {
        self.state
            .lock()
            .await
            .market_prices
            .iter()
            .filter(|p| p.symbol == symbol)
            .cloned()
            .collect()
    }

    /// Sum of one balance across all accounts
    pub async fn total_balance(&self, field: BalanceField) -> Decimal {
        self.state
            .lock()
            .await
            .accounts
            .values()
            .map(|a| a.balance(field))
            .sum()
    }
}

#[async_trait]
impl TransactionManager for InMemoryTransactionManager {
    async fn begin_transaction(&self) -> Result<DBTransaction> {
        if self.faults.trip(FailurePoint::BeginTransaction) {
            return Err(Error::StoreUnavailable("injected connection failure".to_string()));
        }

        let guard = self.state.clone().lock_owned().await;
        Ok(DBTransaction::InMemory(InMemoryTransaction::new(
            guard,
            self.faults.clone(),
        )))
    }

    async fn latest_market_price(&self, symbol: &str) -> Result<Option<MarketPrice>> {
        Ok(self.state.lock().await.latest_market_price(symbol))
    }

    async fn order_settled(&self, order_id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.order_settled(order_id))
    }

    async fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(user_id).cloned())
    }

    async fn save_order_book(&self, symbol: &str, entries: &[OrderBookEntry]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.order_books.insert(symbol.to_string(), entries.to_vec());
        Ok(())
    }

    async fn load_order_book(&self, symbol: &str) -> Result<Vec<OrderBookEntry>> {
        let state = self.state.lock().await;
        Ok(state.order_books.get(symbol).cloned().unwrap_or_default())
    }
}
