// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::{row_decimal, row_opt_timestamp, row_timestamp};

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(v: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
                let s = v.as_str()?;
                s.parse().map_err(|e: String| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }
    };
}

text_enum!(
    /// Lifecycle of an investment plan. `completed` is terminal.
    PlanStatus {
        Active => "active",
        Locked => "locked",
        Completed => "completed",
    }
);

text_enum!(
    PlanType {
        ShortTerm => "short-term",
        SemiAnnual => "semi-annual",
        Annual => "annual",
        AutoInvest => "auto-invest",
        FixedTerm => "fixed-term",
        FlexibleEarn => "flexible-earn",
    }
);

text_enum!(
    TxType {
        Deposit => "deposit",
        Withdrawal => "withdrawal",
        SwapIn => "swap_in",
        SwapOut => "swap_out",
        Investment => "investment",
        InvestmentReturn => "investment_return",
    }
);

text_enum!(
    TxStatus {
        Pending => "pending",
        Approved => "approved",
        Completed => "completed",
        Rejected => "rejected",
    }
);

impl PlanStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, PlanStatus::Completed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub user_id: String,
    pub asset_symbol: String,
    pub asset_name: String,
    pub balance: Decimal,
    pub wallet_address: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub const COLUMNS: &'static str =
        "id, user_id, asset_symbol, asset_name, balance, wallet_address, updated_at";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            user_id: r.get(1)?,
            asset_symbol: r.get(2)?,
            asset_name: r.get(3)?,
            balance: row_decimal(r, 4)?,
            wallet_address: r.get(5)?,
            updated_at: row_timestamp(r, 6)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentPlan {
    pub id: i64,
    pub user_id: String,
    pub wallet_id: i64,
    pub plan_type: PlanType,
    /// Principal; fixed at creation.
    pub amount: Decimal,
    pub apy: Decimal,
    pub term_months: u32,
    pub status: PlanStatus,
    pub start_date: DateTime<Utc>,
    pub unlock_date: Option<DateTime<Utc>>,
    pub current_value: Decimal,
    pub last_gain_calculated: DateTime<Utc>,
    pub matured_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InvestmentPlan {
    pub const COLUMNS: &'static str = "id, user_id, wallet_id, plan_type, amount, apy, term_months, status, \
         start_date, unlock_date, current_value, last_gain_calculated, matured_at, completed_at, created_at";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            user_id: r.get(1)?,
            wallet_id: r.get(2)?,
            plan_type: r.get(3)?,
            amount: row_decimal(r, 4)?,
            apy: row_decimal(r, 5)?,
            term_months: r.get(6)?,
            status: r.get(7)?,
            start_date: row_timestamp(r, 8)?,
            unlock_date: row_opt_timestamp(r, 9)?,
            current_value: row_decimal(r, 10)?,
            last_gain_calculated: row_timestamp(r, 11)?,
            matured_at: row_opt_timestamp(r, 12)?,
            completed_at: row_opt_timestamp(r, 13)?,
            created_at: row_timestamp(r, 14)?,
        })
    }

    /// Whether the lock, if any, has expired at `now`.
    pub fn is_unlocked_at(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.unlock_date) {
            (PlanStatus::Active, _) => true,
            (PlanStatus::Locked, Some(unlock)) => unlock <= now,
            (PlanStatus::Locked, None) => true,
            (PlanStatus::Completed, _) => false,
        }
    }

    pub fn gain(&self) -> Decimal {
        self.current_value - self.amount
    }
}

/// One entry of the investment product catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductTier {
    pub plan_type: PlanType,
    pub apy: Decimal,
    pub term_months: u32,
}

impl ProductTier {
    pub fn label(&self) -> String {
        format!(
            "{} ({} months, {}% APY)",
            self.plan_type, self.term_months, self.apy
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    pub r#type: TxType,
    pub asset_symbol: String,
    pub amount: Decimal,
    pub status: TxStatus,
    pub fee: Decimal,
    pub price_usd: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub wallet_address: Option<String>,
    pub created_by: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub const COLUMNS: &'static str = "id, user_id, type, asset_symbol, amount, status, fee, price_usd, \
         tx_hash, wallet_address, created_by, approved_by, approved_at, notes, created_at";

    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        let price: Option<String> = r.get(7)?;
        let price_usd = match price {
            Some(_) => Some(row_decimal(r, 7)?),
            None => None,
        };
        Ok(Self {
            id: r.get(0)?,
            user_id: r.get(1)?,
            r#type: r.get(2)?,
            asset_symbol: r.get(3)?,
            amount: row_decimal(r, 4)?,
            status: r.get(5)?,
            fee: row_decimal(r, 6)?,
            price_usd,
            tx_hash: r.get(8)?,
            wallet_address: r.get(9)?,
            created_by: r.get(10)?,
            approved_by: r.get(11)?,
            approved_at: row_opt_timestamp(r, 12)?,
            notes: r.get(13)?,
            created_at: row_timestamp(r, 14)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub r#type: String,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            user_id: r.get(1)?,
            r#type: r.get(2)?,
            title: r.get(3)?,
            message: r.get(4)?,
            read: r.get(5)?,
            created_at: row_timestamp(r, 6)?,
        })
    }
}

/// Aggregate USD figures shown on the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: String,
    pub deposit_balance: Decimal,
    pub profit_balance: Decimal,
    pub total_bonus: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinSwap {
    pub id: i64,
    pub user_id: String,
    pub from_wallet_id: i64,
    pub to_wallet_id: i64,
    pub from_symbol: String,
    pub to_symbol: String,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub exchange_rate: Decimal,
    pub created_at: DateTime<Utc>,
}
