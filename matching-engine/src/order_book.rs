//! Order book implementation for price-time priority matching

use std::collections::{BTreeMap, HashMap, HashSet};

use common::decimal::{Price, Quantity};
use common::error::{Error, Result};
use common::model::order::{Order, OrderBookEntry, Side};
use tracing::debug;
use uuid::Uuid;

/// Resting orders at a single price, keyed by insertion sequence
pub type Level = BTreeMap<u64, OrderBookEntry>;

/// Price-indexed storage shared by both sides of the book
#[derive(Debug, Default)]
struct PriceLevels {
    levels: BTreeMap<Price, Level>,
    count: usize,
}

impl PriceLevels {
    fn insert(&mut self, entry: OrderBookEntry) {
        self.levels
            .entry(entry.price())
            .or_default()
            .insert(entry.sequence, entry);
        self.count += 1;
    }

    fn remove(&mut self, price: Price, sequence: u64) -> Option<OrderBookEntry> {
        let level = self.levels.get_mut(&price)?;
        let entry = level.remove(&sequence)?;

        // Clean up empty price levels
        if level.is_empty() {
            self.levels.remove(&price);
        }
        self.count -= 1;
        Some(entry)
    }
}

/// Common trait for order book sides
///
/// A side only has to say in which order its price levels are visited and
/// whether a resting price is acceptable for an incoming limit. Selection,
/// snapshots and depth follow from that.
pub trait OrderBookSide {
    /// Price levels in matching priority
    fn levels(&self) -> Box<dyn Iterator<Item = (&Price, &Level)> + '_>;

    /// Whether an order resting at `resting` crosses an incoming `limit`
    fn crosses(&self, resting: Price, limit: Price) -> bool;

    fn add_entry(&mut self, entry: OrderBookEntry);

    fn remove_entry(&mut self, price: Price, sequence: u64) -> Option<OrderBookEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best entry crossing `limit` that is not in `reserved`
    fn best_crossing(&self, limit: Price, reserved: &HashSet<Uuid>) -> Option<&OrderBookEntry> {
        self.levels()
            .take_while(|(price, _)| self.crosses(**price, limit))
            .flat_map(|(_, level)| level.values())
            .find(|entry| !reserved.contains(&entry.id()))
    }

    /// All entries in priority order
    fn entries(&self) -> Vec<OrderBookEntry> {
        self.levels()
            .flat_map(|(_, level)| level.values().cloned())
            .collect()
    }

    /// Aggregated quantity of the first `limit` price levels, saturating at
    /// the largest decimal
    fn price_levels(&self, limit: usize) -> Vec<(Price, Quantity)> {
        self.levels()
            .take(limit)
            .map(|(price, level)| {
                let total_quantity = level
                    .values()
                    .fold(Quantity::ZERO, |total, entry| total.saturating_add(entry.order.quantity));
                (*price, total_quantity)
            })
            .collect()
    }
}

/// The buy side of the order book (bids)
#[derive(Debug, Default)]
pub struct BidSide {
    limits: PriceLevels,
}

impl BidSide {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderBookSide for BidSide {
    fn levels(&self) -> Box<dyn Iterator<Item = (&Price, &Level)> + '_> {
        // Highest bid first
        Box::new(self.limits.levels.iter().rev())
    }

    fn crosses(&self, resting: Price, limit: Price) -> bool {
        resting >= limit
    }

    fn add_entry(&mut self, entry: OrderBookEntry) {
        self.limits.insert(entry);
    }

    fn remove_entry(&mut self, price: Price, sequence: u64) -> Option<OrderBookEntry> {
        self.limits.remove(price, sequence)
    }

    fn len(&self) -> usize {
        self.limits.count
    }
}

/// The sell side of the order book (asks)
#[derive(Debug, Default)]
pub struct AskSide {
    limits: PriceLevels,
}

impl AskSide {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderBookSide for AskSide {
    fn levels(&self) -> Box<dyn Iterator<Item = (&Price, &Level)> + '_> {
        // Lowest ask first
        Box::new(self.limits.levels.iter())
    }

    fn crosses(&self, resting: Price, limit: Price) -> bool {
        resting <= limit
    }

    fn add_entry(&mut self, entry: OrderBookEntry) {
        self.limits.insert(entry);
    }

    fn remove_entry(&mut self, price: Price, sequence: u64) -> Option<OrderBookEntry> {
        self.limits.remove(price, sequence)
    }

    fn len(&self) -> usize {
        self.limits.count
    }
}

/// Order book for a single market
///
/// Entries claimed by an in-flight settlement are marked as reserved. They
/// keep their position but are skipped when selecting a counter-order.
#[derive(Debug)]
pub struct OrderBook {
    /// Market symbol
    pub symbol: String,
    bids: BidSide,
    asks: AskSide,
    /// Location of every resting order by id
    index: HashMap<Uuid, (Side, Price, u64)>,
    reserved: HashSet<Uuid>,
    next_sequence: u64,
}

impl OrderBook {
    /// Create a new empty order book for the given market
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BidSide::new(),
            asks: AskSide::new(),
            index: HashMap::new(),
            reserved: HashSet::new(),
            next_sequence: 0,
        }
    }

    fn side(&self, side: Side) -> &dyn OrderBookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut dyn OrderBookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Best unreserved resting order on the opposite side that crosses
    /// `limit_price`. Does not modify the book.
    pub fn best_opposing(&self, side: Side, limit_price: Price) -> Option<OrderBookEntry> {
        self.side(side.opposite())
            .best_crossing(limit_price, &self.reserved)
            .cloned()
    }

    /// Add an order at its priority position with the next sequence number
    pub fn insert(&mut self, order: Order) -> Result<OrderBookEntry> {
        if self.index.contains_key(&order.id) {
            return Err(Error::DuplicateOrder(format!(
                "order {} is already resting in {}",
                order.id, self.symbol
            )));
        }

        let entry = OrderBookEntry::new(order, self.next_sequence);
        self.next_sequence += 1;
        self.add_entry(entry.clone());
        Ok(entry)
    }

    fn add_entry(&mut self, entry: OrderBookEntry) {
        let side = entry.order.side;
        self.index
            .insert(entry.id(), (side, entry.price(), entry.sequence));
        self.side_mut(side).add_entry(entry);
    }

    /// Delete a resting order. Removing an absent id is a no-op.
    pub fn remove(&mut self, order_id: Uuid) -> Option<OrderBookEntry> {
        let (side, price, sequence) = self.index.remove(&order_id)?;
        self.reserved.remove(&order_id);
        self.side_mut(side).remove_entry(price, sequence)
    }

    /// Claim a resting order for settlement. Returns false if the order is
    /// absent or already claimed.
    pub fn reserve(&mut self, order_id: Uuid) -> bool {
        self.index.contains_key(&order_id) && self.reserved.insert(order_id)
    }

    /// Make a claimed order selectable again, at its original priority
    pub fn release(&mut self, order_id: Uuid) -> bool {
        self.reserved.remove(&order_id)
    }

    pub fn contains(&self, order_id: Uuid) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Resting orders of one side in priority order
    pub fn snapshot(&self, side: Side) -> Vec<OrderBookEntry> {
        self.side(side).entries()
    }

    /// Resting orders of both sides, bids first
    pub fn entries(&self) -> Vec<OrderBookEntry> {
        let mut entries = self.bids.entries();
        entries.extend(self.asks.entries());
        entries
    }

    /// Aggregated price levels of one side (for market data)
    pub fn depth(&self, side: Side, levels: usize) -> Vec<(Price, Quantity)> {
        self.side(side).price_levels(levels)
    }

    /// Re-insert entries from a persisted snapshot, keeping their sequence
    /// numbers. Entries for another symbol or already resting are skipped.
    pub fn restore(&mut self, entries: Vec<OrderBookEntry>) -> usize {
        let mut restored = 0;
        for entry in entries {
            if entry.order.symbol != self.symbol || self.contains(entry.id()) {
                debug!("Skipping snapshot entry {} for {}", entry.id(), self.symbol);
                continue;
            }
            self.next_sequence = self.next_sequence.max(entry.sequence + 1);
            self.add_entry(entry);
            restored += 1;
        }
        restored
    }

    /// Number of resting orders
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
