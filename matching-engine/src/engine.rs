use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use common::decimal::{Price, Quantity};
use common::error::{Error, Result};
use common::model::order::{Order, OrderBookEntry, Side};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::order_book::OrderBook;

/// Outcome of submitting an order to the engine
#[derive(Debug)]
pub enum MatchDecision {
    /// No crossing counter-order; the order now rests in the book
    Rested(OrderBookEntry),
    /// A counter-order was found and reserved for settlement
    Matched(Reservation),
}

/// A resting maker order claimed for settlement against a taker
///
/// While the reservation lives, the maker stays at its position in the book
/// but cannot be selected by another order. [`Reservation::complete`]
/// removes it after a successful commit; [`Reservation::release`] or
/// dropping the reservation makes it selectable again.
#[derive(Debug)]
pub struct Reservation {
    book: Arc<RwLock<OrderBook>>,
    taker: Order,
    maker: OrderBookEntry,
    finished: bool,
}

impl Reservation {
    fn new(book: Arc<RwLock<OrderBook>>, taker: Order, maker: OrderBookEntry) -> Self {
        Self {
            book,
            taker,
            maker,
            finished: false,
        }
    }

    /// The incoming order
    pub fn taker(&self) -> &Order {
        &self.taker
    }

    /// The reserved resting order
    pub fn maker(&self) -> &OrderBookEntry {
        &self.maker
    }

    fn lock_book(&self) -> RwLockWriteGuard<'_, OrderBook> {
        // The book is left consistent by every mutation, so a poisoned
        // lock is still usable here.
        self.book.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the maker from the book once its trade is committed
    pub fn complete(mut self) -> OrderBookEntry {
        let removed = self.lock_book().remove(self.maker.id());
        if removed.is_none() {
            warn!("Maker order {} was already gone from the book", self.maker.id());
        }
        self.finished = true;
        debug!("Removed maker order {} after settlement", self.maker.id());
        self.maker.clone()
    }

    /// Return the maker to matching at its original priority
    pub fn release(mut self) {
        self.release_maker();
    }

    fn release_maker(&mut self) {
        if !self.finished {
            self.lock_book().release(self.maker.id());
            self.finished = true;
            debug!("Released reservation on maker order {}", self.maker.id());
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.release_maker();
    }
}

/// Read-only view of both sides of a book
#[derive(Debug, Clone, Serialize)]
pub struct BookSnapshot {
    pub symbol: String,
    pub bids: Vec<OrderBookEntry>,
    pub asks: Vec<OrderBookEntry>,
}

/// Aggregated price levels of both sides of a book
#[derive(Debug, Clone, Serialize)]
pub struct MarketDepth {
    pub symbol: String,
    pub bids: Vec<(Price, Quantity)>,
    pub asks: Vec<(Price, Quantity)>,
}

/// The matching engine decides, per incoming order, between resting it and
/// reserving a counter-order for settlement
#[derive(Default)]
pub struct MatchingEngine {
    /// Map of market symbols to order books
    order_books: DashMap<String, Arc<RwLock<OrderBook>>>,
}

impl MatchingEngine {
    /// Create a new matching engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new market. Registering an existing symbol keeps its book.
    pub fn register_market(&self, symbol: impl Into<String>) {
        let symbol = symbol.into();
        info!("Registering market: {}", symbol);
        self.order_books
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(RwLock::new(OrderBook::new(symbol))));
    }

    /// Symbols of all registered markets
    pub fn markets(&self) -> Vec<String> {
        let mut markets: Vec<String> = self.order_books.iter().map(|e| e.key().clone()).collect();
        markets.sort();
        markets
    }

    pub fn has_market(&self, symbol: &str) -> bool {
        self.order_books.contains_key(symbol)
    }

    fn book(&self, symbol: &str) -> Result<Arc<RwLock<OrderBook>>> {
        self.order_books
            .get(symbol)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::MarketNotFound(format!("Market not found: {}", symbol)))
    }

    fn read<'a>(&self, book: &'a RwLock<OrderBook>) -> Result<RwLockReadGuard<'a, OrderBook>> {
        book.read()
            .map_err(|_| Error::Internal("order book lock poisoned".to_string()))
    }

    fn write<'a>(&self, book: &'a RwLock<OrderBook>) -> Result<RwLockWriteGuard<'a, OrderBook>> {
        book.write()
            .map_err(|_| Error::Internal("order book lock poisoned".to_string()))
    }

    /// Match an incoming order or rest it.
    ///
    /// Selection and reservation happen under the book's write lock, so two
    /// takers can never claim the same maker.
    pub fn submit(&self, order: Order) -> Result<MatchDecision> {
        let book = self.book(&order.symbol)?;
        let mut guard = self.write(&book)?;

        if guard.contains(order.id) {
            return Err(Error::DuplicateOrder(format!(
                "order {} is already resting in {}",
                order.id, order.symbol
            )));
        }

        match guard.best_opposing(order.side, order.price) {
            Some(maker) => {
                guard.reserve(maker.id());
                drop(guard);
                debug!(
                    "Order {} ({} {} @ {}) matched resting order {} @ {}",
                    order.id,
                    order.side,
                    order.quantity,
                    order.price,
                    maker.id(),
                    maker.price()
                );
                Ok(MatchDecision::Matched(Reservation::new(book.clone(), order, maker)))
            }
            None => {
                let entry = guard.insert(order)?;
                debug!(
                    "Order {} rests in {} at {} (sequence {})",
                    entry.id(),
                    entry.order.symbol,
                    entry.price(),
                    entry.sequence
                );
                Ok(MatchDecision::Rested(entry))
            }
        }
    }

    /// Both sides of a book in priority order
    pub fn snapshot(&self, symbol: &str) -> Result<BookSnapshot> {
        let book = self.book(symbol)?;
        let guard = self.read(&book)?;
        Ok(BookSnapshot {
            symbol: symbol.to_string(),
            bids: guard.snapshot(Side::Buy),
            asks: guard.snapshot(Side::Sell),
        })
    }

    /// Get market depth
    pub fn market_depth(&self, symbol: &str, levels: usize) -> Result<MarketDepth> {
        let book = self.book(symbol)?;
        let guard = self.read(&book)?;
        Ok(MarketDepth {
            symbol: symbol.to_string(),
            bids: guard.depth(Side::Buy, levels),
            asks: guard.depth(Side::Sell, levels),
        })
    }

    /// All resting entries of a book, for persistence
    pub fn book_entries(&self, symbol: &str) -> Result<Vec<OrderBookEntry>> {
        let book = self.book(symbol)?;
        let guard = self.read(&book)?;
        Ok(guard.entries())
    }

    /// Whether an order is currently resting in a book
    pub fn is_resting(&self, symbol: &str, order_id: Uuid) -> Result<bool> {
        let book = self.book(symbol)?;
        let guard = self.read(&book)?;
        Ok(guard.contains(order_id))
    }

    /// Re-insert persisted entries into a book
    pub fn restore(&self, symbol: &str, entries: Vec<OrderBookEntry>) -> Result<usize> {
        let book = self.book(symbol)?;
        let mut guard = self.write(&book)?;
        let restored = guard.restore(entries);
        info!("Restored {} resting orders into {}", restored, symbol);
        Ok(restored)
    }
}
