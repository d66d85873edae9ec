//! Market price publisher
//!
//! Every settled trade sets the reference price of its market to the trade
//! price. The record is written inside the settlement transaction; the
//! broadcast to subscribers happens only after that transaction committed.

use std::sync::Arc;

use common::db::{DBTransaction, TransactionManager};
use common::decimal::Price;
use common::error::{ErrorExt, Result};
use common::model::market::MarketPrice;
use common::model::trade::Trade;
use tracing::debug;

use crate::channel::{MarketDataChannel, Topic};
use crate::models::{MarketDataMessage, PriceUpdate, TradeMessage};

pub struct MarketPricePublisher {
    store: Arc<dyn TransactionManager>,
    channel: Arc<MarketDataChannel>,
}

impl MarketPricePublisher {
    pub fn new(store: Arc<dyn TransactionManager>, channel: Arc<MarketDataChannel>) -> Self {
        Self { store, channel }
    }

    pub fn channel(&self) -> Arc<MarketDataChannel> {
        self.channel.clone()
    }

    /// Append the settlement price as the new market price within `tx`
    pub async fn record(
        &self,
        tx: &mut DBTransaction,
        symbol: &str,
        price: Price,
    ) -> Result<MarketPrice> {
        let previous = tx
            .latest_market_price(symbol)
            .await
            .with_context(|| format!("reading market price of {}", symbol))?
            .map(|p| p.price);

        let market_price = MarketPrice::new(symbol, price, previous);
        tx.insert_market_price(&market_price)
            .await
            .with_context(|| format!("recording market price of {}", symbol))?;

        Ok(market_price)
    }

    /// Broadcast a committed trade and the price it produced
    pub async fn publish(&self, market_price: &MarketPrice, trade: &Trade) {
        let symbol = market_price.symbol.clone();

        let price_receivers = self
            .channel
            .publish(
                Topic::MarketPrice(symbol.clone()),
                MarketDataMessage::Price(PriceUpdate::from(market_price)),
            )
            .await;
        let trade_receivers = self
            .channel
            .publish(
                Topic::Trades(symbol.clone()),
                MarketDataMessage::Trade(TradeMessage::from(trade)),
            )
            .await;

        debug!(
            "Published price {} and trade {} for {} to {} subscribers",
            market_price.price,
            trade.id,
            symbol,
            price_receivers + trade_receivers
        );
    }

    /// Most recent committed market price
    pub async fn latest(&self, symbol: &str) -> Result<Option<MarketPrice>> {
        self.store.latest_market_price(symbol).await
    }

    /// Price of the most recent settled trade, if any
    pub async fn latest_price(&self, symbol: &str) -> Result<Option<Price>> {
        Ok(self.latest(symbol).await?.map(|p| p.price))
    }
}
