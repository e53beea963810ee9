// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::notifications::{KIND_SWAP, create_notification};
use crate::commands::prices::{PriceOracle, StoredOracle};
use crate::commands::transactions::{NewTransaction, insert_transaction};
use crate::db::write_tx;
use crate::error::{EngineError, EngineResult};
use crate::models::{CoinSwap, TxStatus, TxType, Wallet};
use crate::utils::{dec_text, maybe_print_json, parse_decimal, pretty_table, ts};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use tracing::info;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("list", sub)) => list(conn, sub)?,
        Some(("deposit", sub)) => {
            let user = sub.get_one::<String>("user").unwrap().trim();
            let symbol = sub.get_one::<String>("symbol").unwrap().trim().to_uppercase();
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let tx_hash = sub.get_one::<String>("tx-hash").map(|s| s.trim());
            let id = request_deposit(conn, user, &symbol, amount, tx_hash, Utc::now())?;
            println!("Deposit request #{} for {} {} awaiting approval", id, amount, symbol);
        }
        Some(("withdraw", sub)) => {
            let user = sub.get_one::<String>("user").unwrap().trim();
            let wallet_id = *sub.get_one::<i64>("wallet").unwrap();
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let address = sub.get_one::<String>("address").unwrap().trim();
            let id = request_withdrawal(conn, user, wallet_id, amount, address, Utc::now())?;
            println!("Withdrawal request #{} for {} awaiting approval", id, amount);
        }
        Some(("swap", sub)) => {
            let user = sub.get_one::<String>("user").unwrap().trim();
            let wallet_id = *sub.get_one::<i64>("wallet").unwrap();
            let to = sub.get_one::<String>("to").unwrap().trim().to_uppercase();
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let prices = PriceSnapshot::from_store(conn)?;
            let swap = swap(conn, &prices, user, wallet_id, &to, amount, Utc::now())?;
            println!(
                "Swapped {} {} -> {:.8} {} @ {:.8}",
                swap.from_amount, swap.from_symbol, swap.to_amount, swap.to_symbol, swap.exchange_rate
            );
        }
        _ => {}
    }
    Ok(())
}

pub fn asset_name(symbol: &str) -> String {
    match symbol {
        "BTC" => "Bitcoin".into(),
        "ETH" => "Ethereum".into(),
        "USDT" => "Tether".into(),
        "BNB" => "BNB".into(),
        other => other.to_string(),
    }
}

pub fn get_wallet(conn: &Connection, id: i64) -> EngineResult<Wallet> {
    conn.query_row(
        &format!("SELECT {} FROM wallets WHERE id=?1", Wallet::COLUMNS),
        params![id],
        Wallet::from_row,
    )
    .optional()?
    .ok_or_else(|| EngineError::WalletNotFound(id.to_string()))
}

pub fn find_wallet(conn: &Connection, user_id: &str, symbol: &str) -> EngineResult<Option<Wallet>> {
    let w = conn
        .query_row(
            &format!(
                "SELECT {} FROM wallets WHERE user_id=?1 AND asset_symbol=?2",
                Wallet::COLUMNS
            ),
            params![user_id, symbol],
            Wallet::from_row,
        )
        .optional()?;
    Ok(w)
}

pub fn wallets_for(conn: &Connection, user_id: &str) -> EngineResult<Vec<Wallet>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM wallets WHERE user_id=?1 ORDER BY asset_symbol",
        Wallet::COLUMNS
    ))?;
    let rows = stmt.query_map(params![user_id], Wallet::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn check_amount(amount: Decimal) -> EngineResult<()> {
    if amount <= Decimal::ZERO {
        return Err(EngineError::InvalidAmount(format!(
            "{} must be greater than zero",
            amount
        )));
    }
    Ok(())
}

/// Balance as stored, so the guarded write can compare it verbatim.
fn stored_balance(conn: &Connection, wallet_id: i64) -> EngineResult<(String, Decimal)> {
    let raw: String = conn
        .query_row(
            "SELECT balance FROM wallets WHERE id=?1",
            params![wallet_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| EngineError::WalletNotFound(wallet_id.to_string()))?;
    let parsed = raw.parse::<Decimal>().map_err(|_| EngineError::Corrupt {
        column: "wallets.balance".into(),
        value: raw.clone(),
    })?;
    Ok((raw, parsed))
}

fn swap_balance(
    conn: &Connection,
    wallet_id: i64,
    expected: &str,
    new_balance: Decimal,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let n = conn.execute(
        "UPDATE wallets SET balance=?1, updated_at=?2 WHERE id=?3 AND balance=?4",
        params![dec_text(new_balance), ts(now), wallet_id, expected],
    )?;
    if n != 1 {
        return Err(EngineError::ConcurrentModification(format!("wallet {}", wallet_id)));
    }
    Ok(())
}

/// Removes `amount` from a wallet, re-checking the balance under the guard.
/// Returns the balance left. Call inside a write transaction.
pub fn debit_wallet(
    conn: &Connection,
    wallet_id: i64,
    amount: Decimal,
    now: DateTime<Utc>,
) -> EngineResult<Decimal> {
    check_amount(amount)?;
    let (raw, balance) = stored_balance(conn, wallet_id)?;
    if amount > balance {
        return Err(EngineError::InsufficientBalance {
            requested: amount,
            available: balance,
        });
    }
    let left = balance - amount;
    swap_balance(conn, wallet_id, &raw, left, now)?;
    Ok(left)
}

pub fn credit_wallet(
    conn: &Connection,
    wallet_id: i64,
    amount: Decimal,
    now: DateTime<Utc>,
) -> EngineResult<Decimal> {
    check_amount(amount)?;
    let (raw, balance) = stored_balance(conn, wallet_id)?;
    let total = balance + amount;
    swap_balance(conn, wallet_id, &raw, total, now)?;
    Ok(total)
}

/// Credits the user's wallet for `symbol`, opening it on first use.
pub fn credit_or_create(
    conn: &Connection,
    user_id: &str,
    symbol: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> EngineResult<Wallet> {
    let wallet_id = match find_wallet(conn, user_id, symbol)? {
        Some(w) => {
            credit_wallet(conn, w.id, amount, now)?;
            w.id
        }
        None => {
            check_amount(amount)?;
            conn.execute(
                "INSERT INTO wallets(user_id, asset_symbol, asset_name, balance, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![user_id, symbol, asset_name(symbol), dec_text(amount), ts(now)],
            )?;
            conn.last_insert_rowid()
        }
    };
    get_wallet(conn, wallet_id)
}

pub fn request_deposit(
    conn: &Connection,
    user_id: &str,
    symbol: &str,
    amount: Decimal,
    tx_hash: Option<&str>,
    now: DateTime<Utc>,
) -> EngineResult<i64> {
    check_amount(amount)?;
    let mut t = NewTransaction::new(user_id, TxType::Deposit, symbol, amount)
        .status(TxStatus::Pending);
    t.tx_hash = tx_hash;
    t.price_usd = StoredOracle::new(conn).get_price(symbol).ok();
    let id = insert_transaction(conn, &t, now)?;
    info!(user_id, symbol, %amount, tx_id = id, "deposit requested");
    Ok(id)
}

/// Queues a withdrawal. Funds stay in the wallet until an admin approves.
pub fn request_withdrawal(
    conn: &Connection,
    user_id: &str,
    wallet_id: i64,
    amount: Decimal,
    address: &str,
    now: DateTime<Utc>,
) -> EngineResult<i64> {
    check_amount(amount)?;
    let wallet = get_wallet(conn, wallet_id)?;
    if wallet.user_id != user_id {
        return Err(EngineError::NotOwner {
            entity: format!("wallet {}", wallet_id),
            user_id: user_id.to_string(),
        });
    }
    if amount > wallet.balance {
        return Err(EngineError::InsufficientBalance {
            requested: amount,
            available: wallet.balance,
        });
    }
    let mut t = NewTransaction::new(user_id, TxType::Withdrawal, &wallet.asset_symbol, amount)
        .status(TxStatus::Pending);
    t.wallet_address = Some(address);
    t.price_usd = StoredOracle::new(conn).get_price(&wallet.asset_symbol).ok();
    let id = insert_transaction(conn, &t, now)?;
    info!(user_id, wallet_id, %amount, tx_id = id, "withdrawal requested");
    Ok(id)
}

/// Frozen price table for one swap; read before the write transaction opens.
pub struct PriceSnapshot {
    prices: std::collections::HashMap<String, Decimal>,
}

impl PriceSnapshot {
    pub fn from_oracle(oracle: &dyn PriceOracle, symbols: &[&str]) -> EngineResult<Self> {
        let mut prices = std::collections::HashMap::new();
        for s in symbols {
            prices.insert(s.to_string(), oracle.get_price(s)?);
        }
        Ok(Self { prices })
    }

    /// Last-known quotes for every held asset plus the default set.
    pub fn from_store(conn: &Connection) -> EngineResult<Self> {
        let mut symbols: Vec<String> = Vec::new();
        let mut stmt = conn.prepare("SELECT DISTINCT asset_symbol FROM wallets")?;
        for s in stmt.query_map([], |r| r.get::<_, String>(0))? {
            symbols.push(s?);
        }
        for s in ["BTC", "ETH", "USDT", "BNB"] {
            if !symbols.iter().any(|x| x == s) {
                symbols.push(s.to_string());
            }
        }
        let oracle = StoredOracle::new(conn);
        let mut prices = std::collections::HashMap::new();
        for s in symbols {
            if let Ok(p) = oracle.get_price(&s) {
                prices.insert(s, p);
            }
        }
        Ok(Self { prices })
    }

    fn quote(&self, symbol: &str) -> EngineResult<Decimal> {
        self.prices
            .get(symbol)
            .copied()
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| EngineError::OracleUnavailable {
                symbol: symbol.to_string(),
                reason: "no quote in snapshot".into(),
            })
    }
}

/// Exchanges `amount` of a wallet's asset into `to_symbol` at the USD cross
/// rate. Both legs, the swap record and the ledger notes commit together.
pub fn swap(
    conn: &mut Connection,
    prices: &PriceSnapshot,
    user_id: &str,
    from_wallet_id: i64,
    to_symbol: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> EngineResult<CoinSwap> {
    check_amount(amount)?;
    let tx = write_tx(conn)?;
    let from = get_wallet(&tx, from_wallet_id)?;
    if from.user_id != user_id {
        return Err(EngineError::NotOwner {
            entity: format!("wallet {}", from_wallet_id),
            user_id: user_id.to_string(),
        });
    }
    if from.asset_symbol == to_symbol {
        return Err(EngineError::SameAsset(to_symbol.to_string()));
    }
    let rate = prices.quote(&from.asset_symbol)? / prices.quote(to_symbol)?;
    let to_amount = (amount * rate).round_dp_with_strategy(8, rust_decimal::RoundingStrategy::ToZero);
    if to_amount <= Decimal::ZERO {
        return Err(EngineError::InvalidAmount(format!(
            "{} {} is too small to swap into {}",
            amount, from.asset_symbol, to_symbol
        )));
    }

    debit_wallet(&tx, from.id, amount, now)?;
    let to = credit_or_create(&tx, user_id, to_symbol, to_amount, now)?;
    tx.execute(
        "INSERT INTO coin_swaps(user_id, from_wallet_id, to_wallet_id, from_symbol, to_symbol,
                                from_amount, to_amount, exchange_rate, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'completed', ?9)",
        params![
            user_id,
            from.id,
            to.id,
            from.asset_symbol,
            to_symbol,
            dec_text(amount),
            dec_text(to_amount),
            dec_text(rate),
            ts(now)
        ],
    )?;
    let swap_id = tx.last_insert_rowid();
    insert_transaction(
        &tx,
        &NewTransaction::new(user_id, TxType::SwapOut, &from.asset_symbol, amount)
            .notes(format!("swap #{} to {}", swap_id, to_symbol)),
        now,
    )?;
    insert_transaction(
        &tx,
        &NewTransaction::new(user_id, TxType::SwapIn, to_symbol, to_amount)
            .notes(format!("swap #{} from {}", swap_id, from.asset_symbol)),
        now,
    )?;
    create_notification(
        &tx,
        user_id,
        KIND_SWAP,
        "Swap Completed",
        &format!(
            "Swapped {} {} for {} {}.",
            amount, from.asset_symbol, to_amount, to_symbol
        ),
        now,
    )?;
    tx.commit()?;
    info!(user_id, swap_id, from = %from.asset_symbol, to = to_symbol, %amount, %to_amount, "swap completed");

    Ok(CoinSwap {
        id: swap_id,
        user_id: user_id.to_string(),
        from_wallet_id: from.id,
        to_wallet_id: to.id,
        from_symbol: from.asset_symbol,
        to_symbol: to_symbol.to_string(),
        from_amount: amount,
        to_amount,
        exchange_rate: rate,
        created_at: now,
    })
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let user = sub.get_one::<String>("user").unwrap().trim();
    let data = wallets_for(conn, user)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .into_iter()
            .map(|w| {
                vec![
                    w.id.to_string(),
                    w.asset_symbol,
                    w.asset_name,
                    format!("{:.8}", w.balance),
                    w.wallet_address.unwrap_or_default(),
                    w.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["ID", "Asset", "Name", "Balance", "Address", "Updated"], rows)
        );
    }
    Ok(())
}
