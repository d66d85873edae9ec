//! Account models and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Amount, Decimal};
use crate::error::{Error, Result};
#[cfg(feature = "utoipa")]
use crate::utoipa::ToSchema;

/// The two balances every account carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub enum BalanceField {
    /// Quote currency (HDO)
    Currency,
    /// Traded asset (HCN)
    Asset,
}

impl BalanceField {
    /// Column holding this balance in the `accounts` table
    pub fn column(&self) -> &'static str {
        match self {
            BalanceField::Currency => "currency_balance",
            BalanceField::Asset => "asset_balance",
        }
    }
}

/// Account with its currency and asset balances
///
/// Balances are not checked for sufficiency and may go negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account identifier
    pub user_id: String,
    /// Quote currency balance
    pub currency_balance: Amount,
    /// Asset balance
    pub asset_balance: Amount,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: impl Into<String>, currency_balance: Amount, asset_balance: Amount) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            currency_balance,
            asset_balance,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn balance(&self, field: BalanceField) -> Amount {
        match field {
            BalanceField::Currency => self.currency_balance,
            BalanceField::Asset => self.asset_balance,
        }
    }

    /// Apply a signed delta to one balance. Leaves the account untouched if
    /// the result does not fit a decimal.
    pub fn apply(&mut self, field: BalanceField, delta: Decimal) -> Result<()> {
        let balance = match field {
            BalanceField::Currency => &mut self.currency_balance,
            BalanceField::Asset => &mut self.asset_balance,
        };
        *balance = balance.checked_add(delta).ok_or_else(|| {
            Error::PersistenceFailure(format!(
                "{:?} balance of {} overflows applying {}",
                field, self.user_id, delta
            ))
        })?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// One signed change to one balance of one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceAdjustment {
    pub user_id: String,
    pub field: BalanceField,
    pub delta: Decimal,
}

impl BalanceAdjustment {
    pub fn new(user_id: impl Into<String>, field: BalanceField, delta: Decimal) -> Self {
        Self {
            user_id: user_id.into(),
            field,
            delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::dec;

    #[test]
    fn test_apply_allows_negative_balances() {
        let mut account = Account::new("alice", dec!(10), dec!(0));
        account.apply(BalanceField::Currency, dec!(-50)).unwrap();
        account.apply(BalanceField::Asset, dec!(5)).unwrap();
        assert_eq!(account.balance(BalanceField::Currency), dec!(-40));
        assert_eq!(account.balance(BalanceField::Asset), dec!(5));
    }

    #[test]
    fn test_apply_overflow_leaves_balance() {
        let mut account = Account::new("alice", Decimal::MAX, dec!(0));
        let err = account.apply(BalanceField::Currency, dec!(1)).unwrap_err();
        assert!(matches!(err, Error::PersistenceFailure(_)));
        assert_eq!(account.balance(BalanceField::Currency), Decimal::MAX);
    }
}
