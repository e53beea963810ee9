// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::prices::{PriceOracle, StoredOracle};
use crate::commands::{plans, wallets};
use crate::error::EngineResult;
use crate::models::UserBalance;
use crate::utils::{dec_text, maybe_print_json, pretty_table, row_decimal, ts};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("show", sub)) => show(conn, sub)?,
        _ => {}
    }
    Ok(())
}

pub fn get_user_balance(conn: &Connection, user_id: &str) -> EngineResult<UserBalance> {
    let b = conn
        .query_row(
            "SELECT deposit_balance, profit_balance, total_bonus FROM user_balances WHERE user_id=?1",
            params![user_id],
            |r| {
                Ok(UserBalance {
                    user_id: user_id.to_string(),
                    deposit_balance: row_decimal(r, 0)?,
                    profit_balance: row_decimal(r, 1)?,
                    total_bonus: row_decimal(r, 2)?,
                })
            },
        )
        .optional()?;
    Ok(b.unwrap_or_else(|| UserBalance {
        user_id: user_id.to_string(),
        ..Default::default()
    }))
}

fn store(conn: &Connection, b: &UserBalance, now: DateTime<Utc>) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO user_balances(user_id, deposit_balance, profit_balance, total_bonus, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
            deposit_balance=excluded.deposit_balance,
            profit_balance=excluded.profit_balance,
            total_bonus=excluded.total_bonus,
            updated_at=excluded.updated_at",
        params![
            b.user_id,
            dec_text(b.deposit_balance),
            dec_text(b.profit_balance),
            dec_text(b.total_bonus),
            ts(now)
        ],
    )?;
    Ok(())
}

/// Adds `amount` (may be negative) to the user's aggregate deposit figure,
/// flooring at zero. Meant to run inside the caller's transaction.
pub fn increment_deposit_balance(
    conn: &Connection,
    user_id: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> EngineResult<Decimal> {
    let mut b = get_user_balance(conn, user_id)?;
    b.deposit_balance = (b.deposit_balance + amount).max(Decimal::ZERO);
    store(conn, &b, now)?;
    Ok(b.deposit_balance)
}

/// Profit only ever grows.
pub fn add_profit(
    conn: &Connection,
    user_id: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> EngineResult<Decimal> {
    let mut b = get_user_balance(conn, user_id)?;
    if amount > Decimal::ZERO {
        b.profit_balance += amount;
        store(conn, &b, now)?;
    }
    Ok(b.profit_balance)
}

#[derive(Debug, Serialize)]
pub struct PortfolioSummary {
    pub balance: UserBalance,
    pub wallets_usd: Decimal,
    pub invested_usd: Decimal,
    pub total_usd: Decimal,
}

/// Wallet and open-plan holdings valued at last-known prices.
pub fn portfolio_summary(conn: &Connection, user_id: &str) -> EngineResult<PortfolioSummary> {
    let oracle = StoredOracle::new(conn);
    let quote = |symbol: &str| oracle.get_price(symbol).unwrap_or(Decimal::ZERO);

    let mut wallets_usd = Decimal::ZERO;
    let mut symbol_by_wallet = std::collections::HashMap::new();
    for w in wallets::wallets_for(conn, user_id)? {
        wallets_usd += w.balance * quote(&w.asset_symbol);
        symbol_by_wallet.insert(w.id, w.asset_symbol);
    }

    let mut invested_usd = Decimal::ZERO;
    for p in plans::list_plans(conn, user_id)? {
        if !p.status.is_open() {
            continue;
        }
        if let Some(symbol) = symbol_by_wallet.get(&p.wallet_id) {
            invested_usd += p.current_value * quote(symbol);
        }
    }

    Ok(PortfolioSummary {
        balance: get_user_balance(conn, user_id)?,
        wallets_usd,
        invested_usd,
        total_usd: wallets_usd + invested_usd,
    })
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let user = sub.get_one::<String>("user").unwrap().trim();
    let s = portfolio_summary(conn, user)?;
    if !maybe_print_json(sub.get_flag("json"), false, &s)? {
        let rows = vec![
            vec!["Deposits".into(), format!("{:.2}", s.balance.deposit_balance)],
            vec!["Profit".into(), format!("{:.2}", s.balance.profit_balance)],
            vec!["Bonus".into(), format!("{:.2}", s.balance.total_bonus)],
            vec!["Wallets".into(), format!("{:.2}", s.wallets_usd)],
            vec!["Invested".into(), format!("{:.2}", s.invested_usd)],
            vec!["Total".into(), format!("{:.2}", s.total_usd)],
        ];
        println!("{}", pretty_table(&["Figure", "USD"], rows));
    }
    Ok(())
}
