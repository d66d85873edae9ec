//! Order processing: matching, settlement and book recovery

use std::sync::Arc;

use common::db::TransactionManager;
use common::error::{Error, Result};
use common::model::market::MarketPrice;
use common::model::order::{Order, OrderBookEntry};
use common::model::trade::Trade;
use market_data::MarketPricePublisher;
use matching_engine::{MatchDecision, MatchingEngine};
use tracing::{debug, error, info, warn};

use crate::coordinator::SettlementCoordinator;

/// What happened to a processed order
#[derive(Debug, Clone)]
pub enum OrderOutcome {
    /// The order found no counter-order and now rests in the book
    Rested { entry: OrderBookEntry },
    /// The order was fully filled against a resting maker
    Filled {
        trade: Trade,
        maker: OrderBookEntry,
        market_price: MarketPrice,
    },
}

/// Result of restoring one book from its snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Recovery {
    pub restored: usize,
    pub dropped: usize,
}

pub struct OrderProcessor {
    engine: Arc<MatchingEngine>,
    coordinator: SettlementCoordinator,
    store: Arc<dyn TransactionManager>,
    publisher: Arc<MarketPricePublisher>,
}

impl OrderProcessor {
    pub fn new(
        engine: Arc<MatchingEngine>,
        coordinator: SettlementCoordinator,
        store: Arc<dyn TransactionManager>,
        publisher: Arc<MarketPricePublisher>,
    ) -> Self {
        Self {
            engine,
            coordinator,
            store,
            publisher,
        }
    }

    pub fn engine(&self) -> &Arc<MatchingEngine> {
        &self.engine
    }

    /// Run one order through matching and, on a match, settlement.
    ///
    /// A failed settlement leaves the maker resting at its original priority
    /// and drops the taker, unless the store shows the maker was consumed by
    /// a commit whose acknowledgement was lost.
    pub async fn process(&self, order: Order) -> Result<OrderOutcome> {
        order.validate()?;

        if self.store.order_settled(order.id).await? {
            return Err(Error::DuplicateOrder(format!(
                "order {} was already settled",
                order.id
            )));
        }

        match self.engine.submit(order)? {
            MatchDecision::Rested(entry) => Ok(OrderOutcome::Rested { entry }),
            MatchDecision::Matched(reservation) => {
                let settled = self
                    .coordinator
                    .settle(reservation.taker(), reservation.maker())
                    .await;

                match settled {
                    Ok(settlement) => {
                        // Only a committed trade consumes the maker
                        let maker = reservation.complete();
                        self.publisher
                            .publish(&settlement.market_price, &settlement.trade)
                            .await;

                        Ok(OrderOutcome::Filled {
                            trade: settlement.trade,
                            maker,
                            market_price: settlement.market_price,
                        })
                    }
                    Err(e) => {
                        let maker_id = reservation.maker().id();
                        match self.store.order_settled(maker_id).await {
                            Ok(true) => {
                                warn!(
                                    "Settlement of order {} reported {} but resting order {} was consumed; removing it from the book",
                                    reservation.taker().id,
                                    e,
                                    maker_id
                                );
                                reservation.complete();
                            }
                            Ok(false) => reservation.release(),
                            Err(check_err) => {
                                error!(
                                    "Could not check whether resting order {} was settled: {}",
                                    maker_id, check_err
                                );
                                reservation.release();
                            }
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    /// Restore a book from its persisted snapshot, dropping entries that
    /// were settled after the snapshot was taken
    pub async fn recover(&self, symbol: &str) -> Result<Recovery> {
        let snapshot = self.store.load_order_book(symbol).await?;
        let total = snapshot.len();

        let mut live = Vec::with_capacity(total);
        for entry in snapshot {
            if self.store.order_settled(entry.id()).await? {
                debug!("Dropping settled order {} from {} snapshot", entry.id(), symbol);
            } else {
                live.push(entry);
            }
        }

        let dropped = total - live.len();
        let restored = self.engine.restore(symbol, live)?;
        info!(
            "Recovered {} book: {} orders restored, {} dropped",
            symbol, restored, dropped
        );

        Ok(Recovery { restored, dropped })
    }

    /// Persist the resting orders of every market
    pub async fn persist_books(&self) -> Result<usize> {
        let mut saved = 0;
        for symbol in self.engine.markets() {
            let entries = self.engine.book_entries(&symbol)?;
            self.store.save_order_book(&symbol, &entries).await?;
            debug!("Saved {} resting orders for {}", entries.len(), symbol);
            saved += entries.len();
        }
        Ok(saved)
    }
}
