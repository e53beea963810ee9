// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Admin approval of deposit and withdrawal requests.
//!
//! Deposits credit the wallet on approval. Withdrawals debit it on approval,
//! so a rejected withdrawal has nothing to refund and the wallet is left as is.

use crate::commands::balances::increment_deposit_balance;
use crate::commands::notifications::{KIND_DEPOSIT, KIND_WITHDRAWAL, create_notification};
use crate::commands::prices::{PriceOracle, StoredOracle};
use crate::commands::transactions::{
    TransactionFilter, get_transaction, print_transactions, query_transactions, settle_transaction,
};
use crate::commands::wallets::{credit_or_create, debit_wallet, find_wallet};
use crate::db::write_tx;
use crate::error::{EngineError, EngineResult};
use crate::models::{Transaction, TxStatus, TxType, Wallet};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::info;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("pending", sub)) => {
            let mut data = pending_transactions(conn)?;
            if let Some(t) = sub.get_one::<String>("type") {
                let t: TxType = t.parse().map_err(anyhow::Error::msg)?;
                data.retain(|x| x.r#type == t);
            }
            print_transactions(&data, sub.get_flag("json"), sub.get_flag("jsonl"))?;
        }
        Some((action, sub)) => {
            let tx_id = *sub.get_one::<i64>("tx").unwrap();
            let admin = sub.get_one::<String>("admin").unwrap().trim();
            let now = Utc::now();
            match action {
                "approve-deposit" => {
                    let w = approve_deposit(conn, tx_id, admin, now)?;
                    println!("Deposit #{} approved; {} balance now {}", tx_id, w.asset_symbol, w.balance);
                }
                "reject-deposit" => {
                    reject_deposit(conn, tx_id, admin, now)?;
                    println!("Deposit #{} rejected", tx_id);
                }
                "approve-withdrawal" => {
                    let left = approve_withdrawal(conn, tx_id, admin, now)?;
                    println!("Withdrawal #{} approved; wallet balance now {}", tx_id, left);
                }
                "reject-withdrawal" => {
                    reject_withdrawal(conn, tx_id, admin, now)?;
                    println!("Withdrawal #{} rejected", tx_id);
                }
                _ => {}
            }
        }
        None => {}
    }
    Ok(())
}

/// Oldest first, the order an admin works the queue in.
pub fn pending_transactions(conn: &Connection) -> EngineResult<Vec<Transaction>> {
    let filter = TransactionFilter {
        status: Some(TxStatus::Pending),
        ..Default::default()
    };
    let mut data = query_transactions(conn, &filter)?;
    data.retain(|t| matches!(t.r#type, TxType::Deposit | TxType::Withdrawal));
    data.reverse();
    Ok(data)
}

fn expect_pending(conn: &Connection, tx_id: i64, expected: TxType) -> EngineResult<Transaction> {
    let t = get_transaction(conn, tx_id)?;
    if t.r#type != expected {
        return Err(EngineError::WrongTransactionType {
            id: tx_id,
            expected: expected.to_string(),
            actual: t.r#type.to_string(),
        });
    }
    if t.status != TxStatus::Pending {
        return Err(EngineError::TransactionNotPending {
            id: tx_id,
            status: t.status.to_string(),
        });
    }
    Ok(t)
}

/// USD value of a request, at the quote recorded with it when there is one.
fn usd_value(conn: &Connection, t: &Transaction) -> Decimal {
    let price = t
        .price_usd
        .or_else(|| StoredOracle::new(conn).get_price(&t.asset_symbol).ok())
        .unwrap_or(Decimal::ZERO);
    t.amount * price
}

pub fn approve_deposit(
    conn: &mut Connection,
    tx_id: i64,
    admin: &str,
    now: DateTime<Utc>,
) -> EngineResult<Wallet> {
    let tx = write_tx(conn)?;
    let t = expect_pending(&tx, tx_id, TxType::Deposit)?;
    settle_transaction(&tx, tx_id, TxStatus::Approved, admin, now)?;
    let wallet = credit_or_create(&tx, &t.user_id, &t.asset_symbol, t.amount, now)?;
    increment_deposit_balance(&tx, &t.user_id, usd_value(&tx, &t), now)?;
    create_notification(
        &tx,
        &t.user_id,
        KIND_DEPOSIT,
        "Deposit Approved",
        &format!(
            "Your deposit of {} {} has been approved.",
            t.amount, t.asset_symbol
        ),
        now,
    )?;
    tx.commit()?;
    info!(tx_id, admin, user_id = %t.user_id, amount = %t.amount, symbol = %t.asset_symbol, "deposit approved");
    Ok(wallet)
}

pub fn reject_deposit(
    conn: &mut Connection,
    tx_id: i64,
    admin: &str,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let tx = write_tx(conn)?;
    let t = expect_pending(&tx, tx_id, TxType::Deposit)?;
    settle_transaction(&tx, tx_id, TxStatus::Rejected, admin, now)?;
    create_notification(
        &tx,
        &t.user_id,
        KIND_DEPOSIT,
        "Deposit Rejected",
        &format!(
            "Your deposit of {} {} has been rejected.",
            t.amount, t.asset_symbol
        ),
        now,
    )?;
    tx.commit()?;
    info!(tx_id, admin, user_id = %t.user_id, "deposit rejected");
    Ok(())
}

/// Approves a withdrawal and takes the funds out of the wallet. Fails with
/// `InsufficientBalance`, leaving the request pending, if they are gone.
pub fn approve_withdrawal(
    conn: &mut Connection,
    tx_id: i64,
    admin: &str,
    now: DateTime<Utc>,
) -> EngineResult<Decimal> {
    let tx = write_tx(conn)?;
    let t = expect_pending(&tx, tx_id, TxType::Withdrawal)?;
    let wallet = find_wallet(&tx, &t.user_id, &t.asset_symbol)?.ok_or_else(|| {
        EngineError::WalletNotFound(format!("{}/{}", t.user_id, t.asset_symbol))
    })?;
    settle_transaction(&tx, tx_id, TxStatus::Completed, admin, now)?;
    let left = debit_wallet(&tx, wallet.id, t.amount, now)?;
    increment_deposit_balance(&tx, &t.user_id, -usd_value(&tx, &t), now)?;
    create_notification(
        &tx,
        &t.user_id,
        KIND_WITHDRAWAL,
        "Withdrawal Approved",
        &format!(
            "Your withdrawal of {} {} has been approved.",
            t.amount, t.asset_symbol
        ),
        now,
    )?;
    tx.commit()?;
    info!(tx_id, admin, user_id = %t.user_id, amount = %t.amount, symbol = %t.asset_symbol, "withdrawal approved");
    Ok(left)
}

pub fn reject_withdrawal(
    conn: &mut Connection,
    tx_id: i64,
    admin: &str,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let tx = write_tx(conn)?;
    let t = expect_pending(&tx, tx_id, TxType::Withdrawal)?;
    settle_transaction(&tx, tx_id, TxStatus::Rejected, admin, now)?;
    create_notification(
        &tx,
        &t.user_id,
        KIND_WITHDRAWAL,
        "Withdrawal Rejected",
        &format!(
            "Your withdrawal of {} {} has been rejected and funds returned.",
            t.amount, t.asset_symbol
        ),
        now,
    )?;
    tx.commit()?;
    info!(tx_id, admin, user_id = %t.user_id, "withdrawal rejected");
    Ok(())
}
