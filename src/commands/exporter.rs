// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::transactions::{TransactionFilter, query_transactions};
use crate::models::InvestmentPlan;
use crate::utils::ts;
use anyhow::{Result, bail};
use rusqlite::{Connection, params};
use std::path::Path;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    let (what, sub) = match m.subcommand() {
        Some(x) => x,
        None => return Ok(()),
    };
    let fmt = sub.get_one::<String>("format").unwrap().to_lowercase();
    let out = sub.get_one::<String>("out").unwrap();
    let user = sub.get_one::<String>("user").map(|s| s.trim());
    let n = match what {
        "transactions" => export_transactions(conn, &fmt, Path::new(out), user)?,
        "plans" => export_plans(conn, &fmt, Path::new(out), user)?,
        _ => return Ok(()),
    };
    println!("Exported {} {} to {}", n, what, out);
    Ok(())
}

fn opt<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map(|x| x.to_string()).unwrap_or_default()
}

/// Writes the ledger, oldest first. Returns the number of rows written.
pub fn export_transactions(
    conn: &Connection,
    fmt: &str,
    out: &Path,
    user: Option<&str>,
) -> Result<usize> {
    let filter = TransactionFilter {
        user_id: user.map(str::to_string),
        ..Default::default()
    };
    let mut data = query_transactions(conn, &filter)?;
    data.reverse();

    match fmt {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "id", "created_at", "user_id", "type", "asset", "amount", "status", "fee",
                "price_usd", "approved_by", "approved_at", "notes",
            ])?;
            for t in &data {
                wtr.write_record([
                    t.id.to_string(),
                    ts(t.created_at),
                    t.user_id.clone(),
                    t.r#type.to_string(),
                    t.asset_symbol.clone(),
                    t.amount.to_string(),
                    t.status.to_string(),
                    t.fee.to_string(),
                    opt(&t.price_usd),
                    opt(&t.approved_by),
                    t.approved_at.map(ts).unwrap_or_default(),
                    opt(&t.notes),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => std::fs::write(out, serde_json::to_string_pretty(&data)?)?,
        other => bail!("Unknown format: {} (use csv|json)", other),
    }
    Ok(data.len())
}

pub fn export_plans(
    conn: &Connection,
    fmt: &str,
    out: &Path,
    user: Option<&str>,
) -> Result<usize> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM investment_plans WHERE (?1 IS NULL OR user_id=?1) ORDER BY id",
        InvestmentPlan::COLUMNS
    ))?;
    let rows = stmt.query_map(params![user], InvestmentPlan::from_row)?;
    let mut data = Vec::new();
    for r in rows {
        data.push(r?);
    }

    match fmt {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "id", "user_id", "wallet_id", "plan_type", "amount", "apy", "term_months",
                "status", "start_date", "unlock_date", "current_value", "completed_at",
            ])?;
            for p in &data {
                wtr.write_record([
                    p.id.to_string(),
                    p.user_id.clone(),
                    p.wallet_id.to_string(),
                    p.plan_type.to_string(),
                    p.amount.to_string(),
                    p.apy.to_string(),
                    p.term_months.to_string(),
                    p.status.to_string(),
                    ts(p.start_date),
                    p.unlock_date.map(ts).unwrap_or_default(),
                    p.current_value.to_string(),
                    p.completed_at.map(ts).unwrap_or_default(),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => std::fs::write(out, serde_json::to_string_pretty(&data)?)?,
        other => bail!("Unknown format: {} (use csv|json)", other),
    }
    Ok(data.len())
}
