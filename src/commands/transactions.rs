// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{EngineError, EngineResult};
use crate::models::{Transaction, TxStatus, TxType};
use crate::utils::{dec_text, maybe_print_json, pretty_table, ts};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("list", sub)) => list(conn, sub)?,
        _ => {}
    }
    Ok(())
}

/// Fields of a ledger row at insert time.
#[derive(Debug, Clone)]
pub struct NewTransaction<'a> {
    pub user_id: &'a str,
    pub r#type: TxType,
    pub asset_symbol: &'a str,
    pub amount: Decimal,
    pub status: TxStatus,
    pub price_usd: Option<Decimal>,
    pub tx_hash: Option<&'a str>,
    pub wallet_address: Option<&'a str>,
    pub created_by: Option<&'a str>,
    pub notes: Option<String>,
}

impl<'a> NewTransaction<'a> {
    pub fn new(user_id: &'a str, r#type: TxType, asset_symbol: &'a str, amount: Decimal) -> Self {
        Self {
            user_id,
            r#type,
            asset_symbol,
            amount,
            status: TxStatus::Completed,
            price_usd: None,
            tx_hash: None,
            wallet_address: None,
            created_by: Some(user_id),
            notes: None,
        }
    }

    pub fn status(mut self, status: TxStatus) -> Self {
        self.status = status;
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

pub fn insert_transaction(
    conn: &Connection,
    t: &NewTransaction<'_>,
    now: DateTime<Utc>,
) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO transactions(user_id, type, asset_symbol, amount, status, fee, price_usd,
                                  tx_hash, wallet_address, created_by, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, '0', ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            t.user_id,
            t.r#type,
            t.asset_symbol,
            dec_text(t.amount),
            t.status,
            t.price_usd.map(dec_text),
            t.tx_hash,
            t.wallet_address,
            t.created_by,
            t.notes,
            ts(now)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_transaction(conn: &Connection, id: i64) -> EngineResult<Transaction> {
    conn.query_row(
        &format!("SELECT {} FROM transactions WHERE id=?1", Transaction::COLUMNS),
        params![id],
        Transaction::from_row,
    )
    .optional()?
    .ok_or(EngineError::TransactionNotFound(id))
}

/// Moves a pending row to its final status and stamps the approver in the
/// same statement. Rows that already left `pending` are never touched.
pub fn settle_transaction(
    conn: &Connection,
    id: i64,
    status: TxStatus,
    approver: &str,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let n = conn.execute(
        "UPDATE transactions SET status=?1, approved_by=?2, approved_at=?3
         WHERE id=?4 AND status='pending'",
        params![status, approver, ts(now), id],
    )?;
    if n == 0 {
        let current = get_transaction(conn, id)?;
        return Err(EngineError::TransactionNotPending {
            id,
            status: current.status.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Default, Clone)]
pub struct TransactionFilter {
    pub user_id: Option<String>,
    pub r#type: Option<TxType>,
    pub status: Option<TxStatus>,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn from_matches(sub: &clap::ArgMatches) -> Result<Self> {
        let parse = |k: &str| sub.get_one::<String>(k).map(|s| s.trim().to_string());
        Ok(Self {
            user_id: parse("user"),
            r#type: parse("type")
                .map(|s| s.parse::<TxType>())
                .transpose()
                .map_err(anyhow::Error::msg)?,
            status: parse("status")
                .map(|s| s.parse::<TxStatus>())
                .transpose()
                .map_err(anyhow::Error::msg)?,
            limit: sub.get_one::<usize>("limit").copied(),
        })
    }
}

pub fn query_transactions(
    conn: &Connection,
    filter: &TransactionFilter,
) -> EngineResult<Vec<Transaction>> {
    let mut sql = format!("SELECT {} FROM transactions WHERE 1=1", Transaction::COLUMNS);
    let mut params_vec: Vec<String> = Vec::new();

    if let Some(user) = &filter.user_id {
        sql.push_str(" AND user_id=?");
        params_vec.push(user.clone());
    }
    if let Some(t) = filter.r#type {
        sql.push_str(" AND type=?");
        params_vec.push(t.as_str().into());
    }
    if let Some(s) = filter.status {
        sql.push_str(" AND status=?");
        params_vec.push(s.as_str().into());
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params_vec.iter()), Transaction::from_row)?;
    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }
    Ok(data)
}

pub fn print_transactions(data: &[Transaction], json_flag: bool, jsonl_flag: bool) -> Result<()> {
    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|t| {
                vec![
                    t.id.to_string(),
                    t.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    t.user_id.clone(),
                    t.r#type.to_string(),
                    t.asset_symbol.clone(),
                    t.amount.to_string(),
                    t.status.to_string(),
                    t.notes.clone().unwrap_or_default(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["ID", "When", "User", "Type", "Asset", "Amount", "Status", "Note"],
                rows,
            )
        );
    }
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let filter = TransactionFilter::from_matches(sub)?;
    let data = query_transactions(conn, &filter)?;
    print_transactions(&data, sub.get_flag("json"), sub.get_flag("jsonl"))
}
