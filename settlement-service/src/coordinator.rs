//! Settlement coordinator
//!
//! Turns a matched taker/maker pair into committed state: both balances of
//! both accounts, the taker's order record, the new market price and the
//! trade are written in one transaction, or nothing is.

use std::sync::Arc;
use std::time::Duration;

use common::db::{DBTransaction, TransactionManager};
use common::error::{Error, ErrorExt, Result};
use common::model::account::{BalanceAdjustment, BalanceField};
use common::model::market::MarketPrice;
use common::model::order::{Order, OrderBookEntry, Side};
use common::model::trade::{NewTrade, Trade};
use market_data::MarketPricePublisher;
use tracing::{debug, error, info};

/// Committed result of a settlement
#[derive(Debug, Clone)]
pub struct Settlement {
    pub trade: Trade,
    pub market_price: MarketPrice,
}

/// Balance changes implied by `taker` matching `maker` at the maker's price.
///
/// The buyer receives the taker's quantity of the asset and pays
/// `quantity * maker.price` in currency; the seller does the opposite. The
/// four deltas sum to zero per balance field. Fails with `MalformedOrder`
/// if the amount does not fit a decimal.
pub fn settlement_adjustments(taker: &Order, maker: &Order) -> Result<[BalanceAdjustment; 4]> {
    let quantity = taker.quantity;
    let amount = taker.notional(maker.price)?;
    let (buyer, seller) = match taker.side {
        Side::Buy => (&taker.user_id, &maker.user_id),
        Side::Sell => (&maker.user_id, &taker.user_id),
    };

    Ok([
        BalanceAdjustment::new(buyer.as_str(), BalanceField::Asset, quantity),
        BalanceAdjustment::new(buyer.as_str(), BalanceField::Currency, -amount),
        BalanceAdjustment::new(seller.as_str(), BalanceField::Asset, -quantity),
        BalanceAdjustment::new(seller.as_str(), BalanceField::Currency, amount),
    ])
}

pub struct SettlementCoordinator {
    store: Arc<dyn TransactionManager>,
    publisher: Arc<MarketPricePublisher>,
    timeout: Duration,
}

impl SettlementCoordinator {
    pub fn new(
        store: Arc<dyn TransactionManager>,
        publisher: Arc<MarketPricePublisher>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            timeout,
        }
    }

    /// Settle `taker` against the reserved `maker` entry.
    ///
    /// Nothing is retried here. On any error the transaction is rolled back
    /// and the error returned; a transaction that outlives the timeout is
    /// abandoned and reported as `StoreUnavailable`.
    pub async fn settle(&self, taker: &Order, maker: &OrderBookEntry) -> Result<Settlement> {
        match tokio::time::timeout(self.timeout, self.execute(taker, &maker.order)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Settlement of order {} against {} timed out after {:?}",
                    taker.id,
                    maker.id(),
                    self.timeout
                );
                Err(Error::StoreUnavailable(format!(
                    "settlement of order {} timed out after {:?}",
                    taker.id, self.timeout
                )))
            }
        }
    }

    async fn execute(&self, taker: &Order, maker: &Order) -> Result<Settlement> {
        debug!("Settling order {} against resting order {}", taker.id, maker.id);

        let mut transaction = self
            .store
            .begin_transaction()
            .await
            .with_context(|| format!("Failed to start transaction for order {}", taker.id))?;

        let transaction_result = self.apply(&mut transaction, taker, maker).await;

        match transaction_result {
            Ok(settlement) => {
                transaction
                    .commit()
                    .await
                    .with_context(|| format!("Failed to commit settlement of order {}", taker.id))?;

                info!(
                    "Settled trade {}: {} {} {} @ {} between {} and {}",
                    settlement.trade.id,
                    settlement.trade.taker_side,
                    settlement.trade.quantity,
                    settlement.trade.symbol,
                    settlement.trade.price,
                    settlement.trade.buyer_id,
                    settlement.trade.seller_id
                );
                Ok(settlement)
            }
            Err(e) => {
                debug!("Rolling back settlement of order {}: {}", taker.id, e);

                if let Err(rollback_err) = transaction.rollback().await {
                    // Log rollback failure but return the original error
                    error!("Failed to roll back settlement of order {}: {}", taker.id, rollback_err);
                }

                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut DBTransaction,
        taker: &Order,
        maker: &Order,
    ) -> Result<Settlement> {
        for user_id in [&taker.user_id, &maker.user_id] {
            if !tx.account_exists(user_id).await? {
                return Err(Error::AccountNotFound(format!(
                    "no account for user {} settling order {}",
                    user_id, taker.id
                )));
            }
        }

        if tx.order_exists(taker.id).await? {
            return Err(Error::DuplicateOrder(format!(
                "order {} was already settled",
                taker.id
            )));
        }

        tx.insert_order(taker)
            .await
            .with_context(|| format!("Failed to persist order {}", taker.id))?;

        for adjustment in settlement_adjustments(taker, maker)? {
            let rows = tx.adjust_balance(&adjustment).await?;
            if rows != 1 {
                return Err(Error::BalanceAdjustmentInconsistent(format!(
                    "{} balance of {} changed {} rows settling order {}",
                    adjustment.field.column(),
                    adjustment.user_id,
                    rows,
                    taker.id
                )));
            }
        }

        let market_price = self.publisher.record(tx, &taker.symbol, maker.price).await?;

        let new_trade = NewTrade::from_match(taker, maker)?;
        let trade_id = tx.insert_trade(&new_trade).await?.ok_or_else(|| {
            Error::PersistenceFailure(format!("no trade id returned for order {}", taker.id))
        })?;

        Ok(Settlement {
            trade: new_trade.with_id(trade_id),
            market_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::decimal::{dec, Decimal};

    fn total(adjustments: &[BalanceAdjustment], field: BalanceField) -> Decimal {
        adjustments
            .iter()
            .filter(|a| a.field == field)
            .map(|a| a.delta)
            .sum()
    }

    #[test]
    fn test_sell_taker_adjustments() {
        let maker = Order::new("alice", "HCN/HDO", Side::Buy, dec!(5), dec!(10));
        let taker = Order::new("bob", "HCN/HDO", Side::Sell, dec!(5), dec!(9));

        let adjustments = settlement_adjustments(&taker, &maker).unwrap();
        assert!(adjustments.contains(&BalanceAdjustment::new("alice", BalanceField::Asset, dec!(5))));
        assert!(adjustments.contains(&BalanceAdjustment::new("alice", BalanceField::Currency, dec!(-50))));
        assert!(adjustments.contains(&BalanceAdjustment::new("bob", BalanceField::Asset, dec!(-5))));
        assert!(adjustments.contains(&BalanceAdjustment::new("bob", BalanceField::Currency, dec!(50))));
    }

    #[test]
    fn test_adjustments_conserve_both_balances() {
        let maker = Order::new("alice", "HCN/HDO", Side::Sell, dec!(7), dec!(20.5));
        let taker = Order::new("bob", "HCN/HDO", Side::Buy, dec!(3), dec!(25));

        let adjustments = settlement_adjustments(&taker, &maker).unwrap();
        assert_eq!(total(&adjustments, BalanceField::Asset), dec!(0));
        assert_eq!(total(&adjustments, BalanceField::Currency), dec!(0));
        // Taker quantity at the maker price
        assert!(adjustments.contains(&BalanceAdjustment::new("bob", BalanceField::Currency, dec!(-61.5))));
    }

    #[test]
    fn test_overflowing_amount_is_malformed() {
        let maker = Order::new("alice", "HCN/HDO", Side::Buy, dec!(1), dec!(2));
        let taker = Order::new("bob", "HCN/HDO", Side::Sell, Decimal::MAX, dec!(1));

        assert!(matches!(
            settlement_adjustments(&taker, &maker),
            Err(Error::MalformedOrder(_))
        ));
    }
}
