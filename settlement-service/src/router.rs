//! Order feed routing
//!
//! Each market gets one worker task that processes its orders strictly in
//! arrival order, so matching and settlement for a symbol never overlap.
//! Markets are processed concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use common::error::{Error, Result};
use common::model::order::Order;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::processor::{OrderOutcome, OrderProcessor};

/// Outcome of one order, reported after its worker finished with it
#[derive(Debug)]
pub struct ProcessedOrder {
    pub order_id: Uuid,
    pub symbol: String,
    pub result: Result<OrderOutcome>,
}

/// Counts of a consumed feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub accepted: usize,
    pub rejected: usize,
}

pub struct OrderRouter {
    workers: Mutex<HashMap<String, mpsc::Sender<Order>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl OrderRouter {
    /// Spawn one worker per market.
    ///
    /// When `outcomes` is given, every processed order is reported on it.
    pub fn start(
        processor: Arc<OrderProcessor>,
        markets: &[String],
        queue_capacity: usize,
        outcomes: Option<mpsc::UnboundedSender<ProcessedOrder>>,
    ) -> Self {
        let mut workers = HashMap::new();
        let mut handles = Vec::new();

        for symbol in markets {
            let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
            let handle = tokio::spawn(run_worker(
                symbol.clone(),
                processor.clone(),
                receiver,
                outcomes.clone(),
            ));
            workers.insert(symbol.clone(), sender);
            handles.push(handle);
        }

        Self {
            workers: Mutex::new(workers),
            handles: Mutex::new(handles),
        }
    }

    /// Queue a decoded order on its market's worker
    pub async fn route(&self, order: Order) -> Result<()> {
        let sender = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&order.symbol)
            .cloned()
            .ok_or_else(|| Error::MarketNotFound(format!("Market not found: {}", order.symbol)))?;

        let order_id = order.id;
        sender
            .send(order)
            .await
            .map_err(|_| Error::Internal(format!("worker stopped before order {} was queued", order_id)))
    }

    /// Decode one raw feed message and queue it.
    ///
    /// Malformed messages and orders for unknown markets are logged and
    /// returned as errors; they never affect other messages.
    pub async fn dispatch(&self, message: &[u8]) -> Result<Uuid> {
        let order = match Order::decode(message) {
            Ok(order) => order,
            Err(e) => {
                warn!("Discarding order message: {}", e);
                return Err(e);
            }
        };

        let order_id = order.id;
        if let Err(e) = self.route(order).await {
            warn!("Discarding order {}: {}", order_id, e);
            return Err(e);
        }

        debug!("Queued order {}", order_id);
        Ok(order_id)
    }

    /// Dispatch newline-delimited order messages until the reader ends
    pub async fn consume<R>(&self, reader: R) -> Result<FeedStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut stats = FeedStats::default();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| Error::Internal(format!("reading order feed: {}", e)))?
        {
            match self.dispatch(line.as_bytes()).await {
                Ok(_) => stats.accepted += 1,
                Err(_) => stats.rejected += 1,
            }
        }

        info!(
            "Order feed ended: {} accepted, {} rejected",
            stats.accepted, stats.rejected
        );
        Ok(stats)
    }

    /// Stop accepting orders and wait for workers to drain their queues
    pub async fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        drop(workers);

        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Order worker ended abnormally: {}", e);
            }
        }
    }
}

async fn run_worker(
    symbol: String,
    processor: Arc<OrderProcessor>,
    mut receiver: mpsc::Receiver<Order>,
    outcomes: Option<mpsc::UnboundedSender<ProcessedOrder>>,
) {
    info!("Order worker for {} started", symbol);

    while let Some(order) = receiver.recv().await {
        let order_id = order.id;
        let result = processor.process(order).await;
        log_outcome(&symbol, order_id, &result);

        if let Some(outcomes) = &outcomes {
            // Nobody listening is fine
            let _ = outcomes.send(ProcessedOrder {
                order_id,
                symbol: symbol.clone(),
                result,
            });
        }
    }

    info!("Order worker for {} stopped", symbol);
}

/// Log an order's outcome at the level its error kind calls for
pub fn log_outcome(symbol: &str, order_id: Uuid, result: &Result<OrderOutcome>) {
    match result {
        Ok(OrderOutcome::Rested { entry }) => {
            debug!("Order {} rests in {} at {}", order_id, symbol, entry.price());
        }
        Ok(OrderOutcome::Filled { trade, maker, .. }) => {
            info!(
                "Order {} filled against {} in {} at {} (trade {})",
                order_id,
                maker.id(),
                symbol,
                trade.price,
                trade.id
            );
        }
        Err(e @ (Error::BalanceAdjustmentInconsistent(_) | Error::StoreUnavailable(_))) => {
            error!(
                "Order {} in {} failed ({}, retryable: {}): {}",
                order_id,
                symbol,
                e.kind(),
                e.is_retryable(),
                e
            );
        }
        Err(e) => {
            warn!(
                "Order {} in {} rejected ({}, retryable: {}): {}",
                order_id,
                symbol,
                e.kind(),
                e.is_retryable(),
                e
            );
        }
    }
}
