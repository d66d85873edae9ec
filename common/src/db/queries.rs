//! SQL statements of the durable store
//!
//! Every function is generic over the executor so the same statement runs
//! inside a settlement transaction or directly against the pool.

use sqlx::postgres::PgExecutor;
use sqlx::types::Json;
use uuid::Uuid;

use crate::db::models::{DbAccount, DbMarketPrice};
use crate::error::{Error, Result};
use crate::model::account::{Account, BalanceAdjustment, BalanceField};
use crate::model::market::MarketPrice;
use crate::model::order::{Order, OrderBookEntry};
use crate::model::trade::{NewTrade, TradeId};

// Account Queries

pub async fn account_exists<'e, E>(executor: E, user_id: &str) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(executor)
        .await?;

    Ok(count > 0)
}

pub async fn get_account<'e, E>(executor: E, user_id: &str) -> Result<Option<Account>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, DbAccount>(
        r#"
        SELECT user_id, currency_balance, asset_balance, created_at, updated_at
        FROM accounts
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Account::from))
}

/// Create or overwrite an account with the given balances
pub async fn upsert_account<'e, E>(executor: E, account: &Account) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO accounts (user_id, currency_balance, asset_balance, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE
        SET currency_balance = EXCLUDED.currency_balance,
            asset_balance = EXCLUDED.asset_balance,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&account.user_id)
    .bind(account.currency_balance)
    .bind(account.asset_balance)
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Apply a signed delta to one balance, returning the number of rows touched
pub async fn adjust_balance<'e, E>(executor: E, adjustment: &BalanceAdjustment) -> Result<u64>
where
    E: PgExecutor<'e>,
{
    let sql = match adjustment.field {
        BalanceField::Currency => {
            "UPDATE accounts SET currency_balance = currency_balance + $2, updated_at = NOW() WHERE user_id = $1"
        }
        BalanceField::Asset => {
            "UPDATE accounts SET asset_balance = asset_balance + $2, updated_at = NOW() WHERE user_id = $1"
        }
    };

    let result = sqlx::query(sql)
        .bind(&adjustment.user_id)
        .bind(adjustment.delta)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

// Order Queries

pub async fn order_exists<'e, E>(executor: E, order_id: Uuid) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_id = $1)")
        .bind(order_id)
        .fetch_one(executor)
        .await?;

    Ok(exists)
}

/// Whether the order was persisted as a taker or consumed as a maker
pub async fn order_settled<'e, E>(executor: E, order_id: Uuid) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    let settled: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(SELECT 1 FROM orders WHERE order_id = $1)
            OR EXISTS(SELECT 1 FROM trades WHERE maker_order_id = $1)
        "#,
    )
    .bind(order_id)
    .fetch_one(executor)
    .await?;

    Ok(settled)
}

pub async fn insert_order<'e, E>(executor: E, order: &Order) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO orders (order_id, user_id, symbol, side, quantity, price)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (order_id) DO NOTHING
        "#,
    )
    .bind(order.id)
    .bind(&order.user_id)
    .bind(&order.symbol)
    .bind(order.side.as_str())
    .bind(order.quantity)
    .bind(order.price)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::DuplicateOrder(order.id.to_string()));
    }

    Ok(())
}

// Trade Queries

/// Insert a trade and return its generated id.
///
/// Returns `None` when the store declined to produce an id, which happens
/// when either order already took part in a trade.
pub async fn insert_trade<'e, E>(executor: E, trade: &NewTrade) -> Result<Option<TradeId>>
where
    E: PgExecutor<'e>,
{
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO trades (
            symbol, buyer_id, seller_id, taker_order_id, maker_order_id,
            taker_side, quantity, price, amount, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT DO NOTHING
        RETURNING trade_id
        "#,
    )
    .bind(&trade.symbol)
    .bind(&trade.buyer_id)
    .bind(&trade.seller_id)
    .bind(trade.taker_order_id)
    .bind(trade.maker_order_id)
    .bind(trade.taker_side.as_str())
    .bind(trade.quantity)
    .bind(trade.price)
    .bind(trade.amount)
    .bind(trade.created_at)
    .fetch_optional(executor)
    .await?;

    Ok(id)
}

// Market Price Queries

pub async fn insert_market_price<'e, E>(executor: E, price: &MarketPrice) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO market_price (symbol, current_price, last_price, change_time)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&price.symbol)
    .bind(price.price)
    .bind(price.previous_price)
    .bind(price.recorded_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn latest_market_price<'e, E>(executor: E, symbol: &str) -> Result<Option<MarketPrice>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, DbMarketPrice>(
        r#"
        SELECT symbol, current_price, last_price, change_time
        FROM market_price
        WHERE symbol = $1
        ORDER BY change_time DESC, market_id DESC
        LIMIT 1
        "#,
    )
    .bind(symbol)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(MarketPrice::from))
}

// Order Book Snapshot Queries

pub async fn save_order_book<'e, E>(executor: E, symbol: &str, entries: &[OrderBookEntry]) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO order_books (symbol, data, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (symbol) DO UPDATE
        SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(symbol)
    .bind(Json(entries))
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn load_order_book<'e, E>(executor: E, symbol: &str) -> Result<Vec<OrderBookEntry>>
where
    E: PgExecutor<'e>,
{
    let data: Option<Json<Vec<OrderBookEntry>>> =
        sqlx::query_scalar("SELECT data FROM order_books WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(executor)
            .await?;

    Ok(data.map(|Json(entries)| entries).unwrap_or_default())
}
