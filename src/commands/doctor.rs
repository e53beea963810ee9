// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: &'static str,
    pub detail: String,
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    let issues = run_checks(conn)?;
    if maybe_print_json(m.get_flag("json"), false, &issues)? {
        return Ok(());
    }
    if issues.is_empty() {
        println!("✅ doctor: no issues found");
    } else {
        let rows = issues
            .into_iter()
            .map(|i| vec![i.kind.to_string(), i.detail])
            .collect();
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}

/// Read-only consistency checks over wallets, plans and the ledger.
pub fn run_checks(conn: &Connection) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();

    // Stored decimals that no longer parse; the other checks skip them.
    for (table, column) in [
        ("wallets", "balance"),
        ("investment_plans", "amount"),
        ("investment_plans", "current_value"),
        ("transactions", "amount"),
    ] {
        let mut stmt = conn.prepare(&format!("SELECT id, {column} FROM {table} ORDER BY id"))?;
        let mut cur = stmt.query([])?;
        while let Some(r) = cur.next()? {
            let id: i64 = r.get(0)?;
            let raw: String = r.get(1)?;
            if Decimal::from_str(&raw).is_err() {
                issues.push(Issue {
                    kind: "corrupt_decimal",
                    detail: format!("{table}.{column} #{id} = {raw:?}"),
                });
            }
        }
    }

    let mut stmt = conn.prepare("SELECT id, user_id, asset_symbol, balance FROM wallets ORDER BY id")?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let user: String = r.get(1)?;
        let symbol: String = r.get(2)?;
        let raw: String = r.get(3)?;
        if let Ok(b) = Decimal::from_str(&raw) {
            if b < Decimal::ZERO {
                issues.push(Issue {
                    kind: "negative_balance",
                    detail: format!("wallet #{id} ({user} {symbol}) = {b}"),
                });
            }
        }
    }

    let mut stmt = conn.prepare(
        "SELECT p.id, p.user_id, w.user_id, p.status, p.amount, p.current_value,
                p.unlock_date, p.completed_at
         FROM investment_plans p LEFT JOIN wallets w ON w.id = p.wallet_id
         ORDER BY p.id",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let owner: String = r.get(1)?;
        let wallet_owner: Option<String> = r.get(2)?;
        let status: String = r.get(3)?;
        let amount: String = r.get(4)?;
        let value: String = r.get(5)?;
        let unlock: Option<String> = r.get(6)?;
        let completed: Option<String> = r.get(7)?;

        match wallet_owner {
            None => issues.push(Issue {
                kind: "plan_wallet_missing",
                detail: format!("plan #{id}"),
            }),
            Some(w) if w != owner => issues.push(Issue {
                kind: "plan_owner_mismatch",
                detail: format!("plan #{id} owned by {owner}, wallet by {w}"),
            }),
            Some(_) => {}
        }
        if let (Ok(a), Ok(v)) = (Decimal::from_str(&amount), Decimal::from_str(&value)) {
            if v < a {
                issues.push(Issue {
                    kind: "value_below_principal",
                    detail: format!("plan #{id}: {v} < {a}"),
                });
            }
        }
        if status == "locked" && unlock.is_none() {
            issues.push(Issue {
                kind: "locked_without_unlock_date",
                detail: format!("plan #{id}"),
            });
        }
        if status == "completed" && completed.is_none() {
            issues.push(Issue {
                kind: "completed_without_timestamp",
                detail: format!("plan #{id}"),
            });
        }
    }

    Ok(issues)
}
