// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::plans::{Maturity, accrue_in, maturity_check, open_plan_ids};
use crate::db::write_tx;
use crate::error::EngineResult;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("run", sub)) => {
            let report = run_daily(conn, Utc::now())?;
            if !crate::utils::maybe_print_json(sub.get_flag("json"), false, &report)? {
                println!(
                    "Daily calculations: {} plans accrued ({:.2} USD), {} matured, {} failures",
                    report.plans_accrued, report.profit_usd, report.plans_matured, report.failures
                );
            }
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DailyReport {
    pub plans_accrued: usize,
    pub plans_matured: usize,
    pub failures: usize,
    pub profit_usd: Decimal,
}

/// Accrues one plan in its own transaction and returns the USD profit booked.
fn accrue_and_book(conn: &mut Connection, plan_id: i64, now: DateTime<Utc>) -> EngineResult<Decimal> {
    let tx = write_tx(conn)?;
    let accrual = accrue_in(&tx, plan_id, now)?;
    tx.commit()?;
    Ok(accrual.profit_usd)
}

/// Batch accrual and maturity sweep over every open plan.
pub fn run_daily(conn: &mut Connection, now: DateTime<Utc>) -> EngineResult<DailyReport> {
    let mut report = DailyReport::default();
    let ids = open_plan_ids(conn)?;
    info!(count = ids.len(), "running daily calculations");

    for &plan_id in &ids {
        match accrue_and_book(conn, plan_id, now) {
            Ok(usd) => {
                report.plans_accrued += 1;
                report.profit_usd += usd;
            }
            Err(e) => {
                report.failures += 1;
                warn!(plan_id, error = %e, transient = e.is_transient(), "accrual failed");
            }
        }
        match maturity_check(conn, plan_id, now) {
            Ok(Maturity::Matured) => report.plans_matured += 1,
            Ok(_) => {}
            Err(e) => {
                report.failures += 1;
                warn!(plan_id, error = %e, transient = e.is_transient(), "maturity check failed");
            }
        }
    }

    info!(
        accrued = report.plans_accrued,
        matured = report.plans_matured,
        failures = report.failures,
        profit_usd = %report.profit_usd,
        "daily calculations completed"
    );
    Ok(report)
}
