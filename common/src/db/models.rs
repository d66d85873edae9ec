use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

use crate::model::account::Account;
use crate::model::market::MarketPrice;

/// Database model for the accounts table
#[derive(Debug, Clone, FromRow)]
pub struct DbAccount {
    pub user_id: String,
    pub currency_balance: Decimal,
    pub asset_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbAccount> for Account {
    fn from(row: DbAccount) -> Self {
        Account {
            user_id: row.user_id,
            currency_balance: row.currency_balance,
            asset_balance: row.asset_balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database model for the market_price table
#[derive(Debug, Clone, FromRow)]
pub struct DbMarketPrice {
    pub symbol: String,
    pub current_price: Decimal,
    pub last_price: Option<Decimal>,
    pub change_time: DateTime<Utc>,
}

impl From<DbMarketPrice> for MarketPrice {
    fn from(row: DbMarketPrice) -> Self {
        MarketPrice {
            symbol: row.symbol,
            price: row.current_price,
            previous_price: row.last_price,
            recorded_at: row.change_time,
        }
    }
}
