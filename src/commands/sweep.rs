// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Automatic investment of uninvested funds.
//!
//! One call is one scheduler tick. Nothing is kept between ticks: a wallet
//! that was swept has a zero balance, so the next tick skips it.

use crate::commands::plans::{PlanOrigin, PlanRequest, create_plan};
use crate::commands::wallets::{find_wallet, get_wallet};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::ProductTier;
use crate::utils::{maybe_print_json, row_timestamp, ts};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("run", sub)) => {
            let cfg = EngineConfig::load(conn)?;
            let report = run_auto_invest(conn, &cfg, Utc::now(), &mut rand::thread_rng())?;
            if !maybe_print_json(sub.get_flag("json"), false, &report)? {
                println!(
                    "Auto-invest: {} deposits, {} idle wallets invested ({} failures)",
                    report.deposits_processed, report.wallets_processed, report.failures
                );
            }
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub deposits_processed: usize,
    pub wallets_processed: usize,
    pub failures: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.deposits_processed + self.wallets_processed
    }
}

struct ApprovedDeposit {
    id: i64,
    user_id: String,
    asset_symbol: String,
    approved_at: DateTime<Utc>,
}

/// Runs both passes. Per-item failures are logged and counted, never raised.
pub fn run_auto_invest<R: Rng + ?Sized>(
    conn: &mut Connection,
    cfg: &EngineConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> EngineResult<SweepReport> {
    info!("starting auto-invest check");
    let mut report = SweepReport::default();
    invest_approved_deposits(conn, cfg, now, &mut report)?;
    if let Err(e) = invest_idle_wallets(conn, cfg, now, rng, &mut report) {
        error!(error = %e, "idle wallet pass failed");
    }
    info!(
        deposits = report.deposits_processed,
        wallets = report.wallets_processed,
        failures = report.failures,
        "auto-invest check finished"
    );
    Ok(report)
}

fn approved_deposits_between(
    conn: &Connection,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
) -> EngineResult<Vec<ApprovedDeposit>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, asset_symbol, approved_at FROM transactions
         WHERE type='deposit' AND status='approved' AND approved_at > ?1 AND approved_at < ?2
         ORDER BY approved_at, id",
    )?;
    let rows = stmt.query_map(params![ts(after), ts(before)], |r| {
        Ok(ApprovedDeposit {
            id: r.get(0)?,
            user_id: r.get(1)?,
            asset_symbol: r.get(2)?,
            approved_at: row_timestamp(r, 3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn has_plan_since(conn: &Connection, user_id: &str, since: DateTime<Utc>) -> EngineResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT id FROM investment_plans WHERE user_id=?1 AND created_at >= ?2 LIMIT 1",
            params![user_id, ts(since)],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// Pass A: deposits approved inside the grace window whose owner has not
/// invested since go into the shortest-term tier, whole wallet balance.
fn invest_approved_deposits(
    conn: &mut Connection,
    cfg: &EngineConfig,
    now: DateTime<Utc>,
    report: &mut SweepReport,
) -> EngineResult<()> {
    let deposits = approved_deposits_between(conn, now - cfg.window(), now - cfg.grace())?;
    info!(count = deposits.len(), "approved deposits to check");
    let Some(tier) = cfg.shortest_tier() else {
        warn!("product catalog is empty, skipping deposit pass");
        return Ok(());
    };

    for deposit in deposits {
        match sweep_deposit(conn, tier, &deposit, now) {
            Ok(Some(amount)) => {
                report.deposits_processed += 1;
                info!(
                    tx_id = deposit.id,
                    user_id = %deposit.user_id,
                    %amount,
                    symbol = %deposit.asset_symbol,
                    "auto-invested approved deposit"
                );
            }
            Ok(None) => {}
            Err(e) => {
                report.failures += 1;
                warn!(
                    tx_id = deposit.id,
                    user_id = %deposit.user_id,
                    error = %e,
                    transient = e.is_transient(),
                    "deposit auto-invest failed"
                );
            }
        }
    }
    Ok(())
}

fn sweep_deposit(
    conn: &mut Connection,
    tier: &ProductTier,
    deposit: &ApprovedDeposit,
    now: DateTime<Utc>,
) -> EngineResult<Option<Decimal>> {
    if has_plan_since(conn, &deposit.user_id, deposit.approved_at)? {
        info!(user_id = %deposit.user_id, "user already invested since approval, skipping");
        return Ok(None);
    }
    let wallet = match find_wallet(conn, &deposit.user_id, &deposit.asset_symbol)? {
        Some(w) if w.balance > Decimal::ZERO => w,
        Some(_) => return Ok(None),
        None => {
            return Err(EngineError::WalletNotFound(format!(
                "{}/{}",
                deposit.user_id, deposit.asset_symbol
            )));
        }
    };
    let req = PlanRequest {
        user_id: &wallet.user_id,
        wallet_id: wallet.id,
        plan_type: tier.plan_type,
        amount: wallet.balance,
        apy: tier.apy,
        term_months: tier.term_months,
    };
    create_plan(conn, &req, PlanOrigin::DepositSweep, now)?;
    Ok(Some(wallet.balance))
}

fn idle_wallet_ids(conn: &Connection, stale_before: DateTime<Utc>) -> EngineResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM wallets WHERE CAST(balance AS REAL) > 0 AND updated_at <= ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![ts(stale_before)], |r| r.get::<_, i64>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Pass B: wallets untouched past the idle threshold go into a random tier.
fn invest_idle_wallets<R: Rng + ?Sized>(
    conn: &mut Connection,
    cfg: &EngineConfig,
    now: DateTime<Utc>,
    rng: &mut R,
    report: &mut SweepReport,
) -> EngineResult<()> {
    let ids = idle_wallet_ids(conn, now - cfg.idle_threshold())?;
    info!(count = ids.len(), "wallets with idle balances");

    for wallet_id in ids {
        let Some(tier) = cfg.catalog.choose(rng) else {
            warn!("product catalog is empty, skipping idle pass");
            return Ok(());
        };
        match sweep_wallet(conn, tier, wallet_id, now) {
            Ok(Some(amount)) => {
                report.wallets_processed += 1;
                info!(wallet_id, %amount, plan_type = %tier.plan_type, "auto-invested idle wallet");
            }
            Ok(None) => {}
            Err(e) => {
                report.failures += 1;
                warn!(wallet_id, error = %e, transient = e.is_transient(), "idle wallet auto-invest failed");
            }
        }
    }
    Ok(())
}

fn sweep_wallet(
    conn: &mut Connection,
    tier: &ProductTier,
    wallet_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<Option<Decimal>> {
    let wallet = get_wallet(conn, wallet_id)?;
    if wallet.balance <= Decimal::ZERO {
        return Ok(None);
    }
    let req = PlanRequest {
        user_id: &wallet.user_id,
        wallet_id: wallet.id,
        plan_type: tier.plan_type,
        amount: wallet.balance,
        apy: tier.apy,
        term_months: tier.term_months,
    };
    create_plan(conn, &req, PlanOrigin::IdleSweep, now)?;
    Ok(Some(wallet.balance))
}
