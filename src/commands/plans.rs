// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Investment plan lifecycle: funding, accrual, maturity and settlement.
//!
//! Every mutation runs in one write transaction together with the wallet
//! movement, the ledger note and the notification it implies, so a plan never
//! exists without its debit and a settlement never credits twice.

use crate::commands::balances::add_profit;
use crate::commands::notifications::{KIND_INVESTMENT, create_notification};
use crate::commands::prices::{PriceOracle, StoredOracle};
use crate::commands::transactions::{NewTransaction, insert_transaction};
use crate::commands::wallets::{credit_wallet, debit_wallet, get_wallet};
use crate::config::EngineConfig;
use crate::db::write_tx;
use crate::error::{EngineError, EngineResult};
use crate::models::{InvestmentPlan, PlanStatus, PlanType, TxType};
use crate::utils::{dec_text, elapsed_days, maybe_print_json, parse_decimal, pretty_table, ts};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// A lock "month" is a flat 30 days.
pub const DAYS_PER_TERM_MONTH: i64 = 30;
const DAYS_PER_YEAR: i64 = 365;
pub const MAX_TERM_MONTHS: u32 = 120;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("create", sub)) => create_cmd(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("withdraw", sub)) => {
            let user = sub.get_one::<String>("user").unwrap().trim();
            let plan_id = *sub.get_one::<i64>("plan").unwrap();
            let settled = withdraw_plan(conn, plan_id, user, Utc::now())?;
            println!("Plan #{} settled: {} returned to wallet", plan_id, settled);
        }
        Some(("accrue", sub)) => {
            let plan_id = *sub.get_one::<i64>("plan").unwrap();
            let gain = accrue(conn, plan_id, Utc::now())?;
            println!("Plan #{} accrued {}", plan_id, gain);
        }
        Some(("mature", sub)) => {
            let plan_id = *sub.get_one::<i64>("plan").unwrap();
            let m = maturity_check(conn, plan_id, Utc::now())?;
            println!("Plan #{}: {:?}", plan_id, m);
        }
        Some(("catalog", sub)) => {
            let cfg = EngineConfig::load(conn)?;
            if !maybe_print_json(sub.get_flag("json"), false, &cfg.catalog)? {
                let rows = cfg
                    .catalog
                    .iter()
                    .map(|t| {
                        vec![
                            t.plan_type.to_string(),
                            format!("{}%", t.apy),
                            t.term_months.to_string(),
                        ]
                    })
                    .collect();
                println!("{}", pretty_table(&["Plan", "APY", "Months"], rows));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Who asked for the plan; only changes the notification wording and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOrigin {
    User,
    DepositSweep,
    IdleSweep,
}

#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    /// Acting user; must own the wallet.
    pub user_id: &'a str,
    pub wallet_id: i64,
    pub plan_type: PlanType,
    pub amount: Decimal,
    pub apy: Decimal,
    pub term_months: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maturity {
    /// Flexible plan; withdrawable at any time.
    Open,
    Locked { unlock_date: DateTime<Utc> },
    /// Lock expired and was detected by this call.
    Matured,
    AlreadyMatured,
    Completed,
}

pub fn get_plan(conn: &Connection, id: i64) -> EngineResult<InvestmentPlan> {
    conn.query_row(
        &format!(
            "SELECT {} FROM investment_plans WHERE id=?1",
            InvestmentPlan::COLUMNS
        ),
        params![id],
        InvestmentPlan::from_row,
    )
    .optional()?
    .ok_or(EngineError::PlanNotFound(id))
}

pub fn list_plans(conn: &Connection, user_id: &str) -> EngineResult<Vec<InvestmentPlan>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM investment_plans WHERE user_id=?1 ORDER BY created_at DESC, id DESC",
        InvestmentPlan::COLUMNS
    ))?;
    let rows = stmt.query_map(params![user_id], InvestmentPlan::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Ids of every plan still accruing.
pub fn open_plan_ids(conn: &Connection) -> EngineResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM investment_plans WHERE status IN ('active','locked') ORDER BY id",
    )?;
    let rows = stmt.query_map([], |r| r.get::<_, i64>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn unlock_date_for(start: DateTime<Utc>, term_months: u32) -> Option<DateTime<Utc>> {
    if term_months == 0 {
        None
    } else {
        Some(start + Duration::days(DAYS_PER_TERM_MONTH * i64::from(term_months)))
    }
}

/// Locks `req.amount` from the wallet into a new plan.
pub fn create_plan(
    conn: &mut Connection,
    req: &PlanRequest<'_>,
    origin: PlanOrigin,
    now: DateTime<Utc>,
) -> EngineResult<InvestmentPlan> {
    if req.amount <= Decimal::ZERO {
        return Err(EngineError::InvalidAmount(format!(
            "plan amount {} must be greater than zero",
            req.amount
        )));
    }
    if req.apy.is_sign_negative() {
        return Err(EngineError::InvalidAmount(format!("APY {} is negative", req.apy)));
    }
    if req.term_months > MAX_TERM_MONTHS {
        return Err(EngineError::InvalidAmount(format!(
            "term of {} months exceeds {}",
            req.term_months, MAX_TERM_MONTHS
        )));
    }

    let tx = write_tx(conn)?;
    let wallet = get_wallet(&tx, req.wallet_id)?;
    if wallet.user_id != req.user_id {
        return Err(EngineError::NotOwner {
            entity: format!("wallet {}", wallet.id),
            user_id: req.user_id.to_string(),
        });
    }
    debit_wallet(&tx, wallet.id, req.amount, now)?;

    let unlock_date = unlock_date_for(now, req.term_months);
    let status = if unlock_date.is_some() {
        PlanStatus::Locked
    } else {
        PlanStatus::Active
    };
    tx.execute(
        "INSERT INTO investment_plans(user_id, wallet_id, plan_type, amount, apy, term_months, status,
                                      start_date, unlock_date, current_value, last_gain_calculated,
                                      created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?4, ?8, ?8, ?8)",
        params![
            req.user_id,
            wallet.id,
            req.plan_type,
            dec_text(req.amount),
            dec_text(req.apy),
            req.term_months,
            status,
            ts(now),
            unlock_date.map(ts),
        ],
    )?;
    let plan_id = tx.last_insert_rowid();

    insert_transaction(
        &tx,
        &NewTransaction::new(req.user_id, TxType::Investment, &wallet.asset_symbol, req.amount)
            .notes(format!("funded plan #{} ({})", plan_id, req.plan_type)),
        now,
    )?;

    let terms = if req.term_months > 0 {
        format!("{} months, {}% APY", req.term_months, req.apy)
    } else {
        format!("flexible, {}% APY", req.apy)
    };
    let (title, message) = match origin {
        PlanOrigin::User => (
            "Investment Plan Created",
            format!(
                "You invested {} {} in {} ({}).",
                req.amount, wallet.asset_symbol, req.plan_type, terms
            ),
        ),
        PlanOrigin::DepositSweep => (
            "Auto Investment Created",
            format!(
                "Your {} {} has been automatically invested in {} ({}) to start earning returns.",
                req.amount, wallet.asset_symbol, req.plan_type, terms
            ),
        ),
        PlanOrigin::IdleSweep => (
            "Auto Investment Created",
            format!(
                "Your {} {} that was idle has been automatically invested in {} ({}) to start earning returns.",
                req.amount, wallet.asset_symbol, req.plan_type, terms
            ),
        ),
    };
    create_notification(&tx, req.user_id, KIND_INVESTMENT, title, &message, now)?;

    let plan = get_plan(&tx, plan_id)?;
    tx.commit()?;
    info!(
        plan_id,
        user_id = req.user_id,
        wallet_id = wallet.id,
        amount = %req.amount,
        plan_type = %req.plan_type,
        ?origin,
        "investment plan created"
    );
    Ok(plan)
}

/// End of the accrual window at `now`: locked plans stop earning at unlock.
pub fn accrual_end(plan: &InvestmentPlan, now: DateTime<Utc>) -> DateTime<Utc> {
    match (plan.status, plan.unlock_date) {
        (PlanStatus::Locked, Some(unlock)) if unlock < now => unlock,
        _ => now,
    }
}

/// Gain earned since the plan's high-water mark: simple daily-prorated
/// interest on the current value, `value * apy/100/365 * days`.
pub fn pending_gain(plan: &InvestmentPlan, now: DateTime<Utc>) -> EngineResult<Decimal> {
    if !plan.status.is_open() {
        return Ok(Decimal::ZERO);
    }
    let days = elapsed_days(plan.last_gain_calculated, accrual_end(plan, now));
    if days.is_zero() || plan.apy.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let daily_rate = plan.apy / Decimal::ONE_HUNDRED / Decimal::from(DAYS_PER_YEAR);
    plan.current_value
        .checked_mul(daily_rate)
        .and_then(|v| v.checked_mul(days))
        .map(|g| g.max(Decimal::ZERO))
        .ok_or_else(|| EngineError::InvalidAmount(format!("accrual overflow on plan {}", plan.id)))
}

/// Outcome of one accrual step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accrual {
    pub gain: Decimal,
    /// USD value booked to the owner's profit balance; zero without a quote.
    pub profit_usd: Decimal,
}

/// Accrues one plan inside the caller's transaction. The value and the
/// high-water mark move together, guarded by the mark read. A positive gain
/// is booked as USD profit and announced to the owner in the same transaction.
pub fn accrue_in(conn: &Connection, plan_id: i64, now: DateTime<Utc>) -> EngineResult<Accrual> {
    let plan = get_plan(conn, plan_id)?;
    if !plan.status.is_open() {
        return Ok(Accrual::default());
    }
    let end = accrual_end(&plan, now);
    if end <= plan.last_gain_calculated {
        return Ok(Accrual::default());
    }
    let gain = pending_gain(&plan, now)?;
    let value = plan
        .current_value
        .checked_add(gain)
        .ok_or_else(|| EngineError::InvalidAmount(format!("accrual overflow on plan {}", plan.id)))?;
    let n = conn.execute(
        "UPDATE investment_plans
            SET current_value=?1, last_gain_calculated=?2, updated_at=?3
          WHERE id=?4 AND last_gain_calculated=?5 AND status IN ('active','locked')",
        params![dec_text(value), ts(end), ts(now), plan_id, ts(plan.last_gain_calculated)],
    )?;
    if n != 1 {
        return Err(EngineError::ConcurrentModification(format!("plan {}", plan_id)));
    }
    debug!(plan_id, gain = %gain, "plan accrued");
    if gain <= Decimal::ZERO {
        return Ok(Accrual::default());
    }

    let symbol = get_wallet(conn, plan.wallet_id)?.asset_symbol;
    let mut profit_usd = Decimal::ZERO;
    match StoredOracle::new(conn).get_price(&symbol) {
        Ok(price) => {
            profit_usd = gain.checked_mul(price).ok_or_else(|| {
                EngineError::InvalidAmount(format!("profit overflow on plan {}", plan.id))
            })?;
            add_profit(conn, &plan.user_id, profit_usd, now)?;
        }
        Err(e) => warn!(plan_id, error = %e, "no USD quote, profit balance not updated"),
    }
    create_notification(
        conn,
        &plan.user_id,
        KIND_INVESTMENT,
        "Profit Earned",
        &format!(
            "You earned {} {} from your {} plan.",
            gain.round_dp(8).normalize(),
            symbol,
            plan.plan_type
        ),
        now,
    )?;
    Ok(Accrual { gain, profit_usd })
}

pub fn accrue(conn: &mut Connection, plan_id: i64, now: DateTime<Utc>) -> EngineResult<Decimal> {
    let tx = write_tx(conn)?;
    let accrual = accrue_in(&tx, plan_id, now)?;
    tx.commit()?;
    Ok(accrual.gain)
}

/// Stamps a locked plan whose unlock date has passed and tells its owner.
/// The plan stays `locked`; the owner withdraws it explicitly.
pub fn maturity_check(
    conn: &mut Connection,
    plan_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<Maturity> {
    let tx = write_tx(conn)?;
    let plan = get_plan(&tx, plan_id)?;
    let outcome = match (plan.status, plan.unlock_date) {
        (PlanStatus::Completed, _) => Maturity::Completed,
        (PlanStatus::Active, _) | (PlanStatus::Locked, None) => Maturity::Open,
        (PlanStatus::Locked, Some(unlock)) if unlock > now => Maturity::Locked { unlock_date: unlock },
        (PlanStatus::Locked, Some(_)) if plan.matured_at.is_some() => Maturity::AlreadyMatured,
        (PlanStatus::Locked, Some(_)) => {
            let n = tx.execute(
                "UPDATE investment_plans SET matured_at=?1, updated_at=?1
                 WHERE id=?2 AND matured_at IS NULL",
                params![ts(now), plan_id],
            )?;
            if n != 1 {
                return Err(EngineError::ConcurrentModification(format!("plan {}", plan_id)));
            }
            let symbol = get_wallet(&tx, plan.wallet_id)?.asset_symbol;
            create_notification(
                &tx,
                &plan.user_id,
                KIND_INVESTMENT,
                "Investment Unlocked",
                &format!(
                    "Your {} plan of {} {} has reached its unlock date and can now be withdrawn.",
                    plan.plan_type, plan.amount, symbol
                ),
                now,
            )?;
            info!(plan_id, user_id = %plan.user_id, "investment plan matured");
            Maturity::Matured
        }
    };
    tx.commit()?;
    Ok(outcome)
}

/// Settles a plan back into its source wallet and returns the amount credited.
pub fn withdraw_plan(
    conn: &mut Connection,
    plan_id: i64,
    acting_user: &str,
    now: DateTime<Utc>,
) -> EngineResult<Decimal> {
    let tx = write_tx(conn)?;
    let plan = get_plan(&tx, plan_id)?;
    if plan.user_id != acting_user {
        return Err(EngineError::NotOwner {
            entity: format!("plan {}", plan_id),
            user_id: acting_user.to_string(),
        });
    }
    if plan.status == PlanStatus::Completed {
        return Err(EngineError::PlanCompleted(plan_id));
    }
    if !plan.is_unlocked_at(now) {
        if let Some(unlock) = plan.unlock_date {
            return Err(EngineError::StillLocked {
                plan_id,
                unlock_date: unlock,
            });
        }
    }

    accrue_in(&tx, plan_id, now)?;
    let plan = get_plan(&tx, plan_id)?;
    let wallet = get_wallet(&tx, plan.wallet_id)?;
    credit_wallet(&tx, wallet.id, plan.current_value, now)?;

    let n = tx.execute(
        "UPDATE investment_plans SET status='completed', completed_at=?1, updated_at=?1
         WHERE id=?2 AND status=?3",
        params![ts(now), plan_id, plan.status],
    )?;
    if n != 1 {
        return Err(EngineError::ConcurrentModification(format!("plan {}", plan_id)));
    }
    insert_transaction(
        &tx,
        &NewTransaction::new(acting_user, TxType::InvestmentReturn, &wallet.asset_symbol, plan.current_value)
            .notes(format!("settled plan #{} (principal {})", plan_id, plan.amount)),
        now,
    )?;
    create_notification(
        &tx,
        acting_user,
        KIND_INVESTMENT,
        "Investment Withdrawn",
        &format!(
            "{} {} from your {} plan has been returned to your wallet.",
            plan.current_value, wallet.asset_symbol, plan.plan_type
        ),
        now,
    )?;
    tx.commit()?;
    info!(
        plan_id,
        user_id = acting_user,
        settled = %plan.current_value,
        gain = %plan.gain(),
        "investment plan withdrawn"
    );
    Ok(plan.current_value)
}

fn create_cmd(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let user = sub.get_one::<String>("user").unwrap().trim();
    let wallet_id = *sub.get_one::<i64>("wallet").unwrap();
    let plan_type: PlanType = sub
        .get_one::<String>("type")
        .unwrap()
        .parse()
        .map_err(anyhow::Error::msg)?;
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;

    let cfg = EngineConfig::load(conn)?;
    let tier = cfg.tier(plan_type);
    let apy = match (sub.get_one::<String>("apy"), tier) {
        (Some(s), _) => parse_decimal(s)?,
        (None, Some(t)) => t.apy,
        (None, None) => return Err(anyhow!("--apy is required for plan type {}", plan_type)),
    };
    let term_months = match (sub.get_one::<u32>("term"), tier) {
        (Some(t), _) => *t,
        (None, Some(t)) => t.term_months,
        (None, None) => 0,
    };

    let req = PlanRequest {
        user_id: user,
        wallet_id,
        plan_type,
        amount,
        apy,
        term_months,
    };
    let plan = create_plan(conn, &req, PlanOrigin::User, Utc::now())?;
    match plan.unlock_date {
        Some(d) => println!(
            "Plan #{} locked {} at {}% APY until {}",
            plan.id,
            plan.amount,
            plan.apy,
            d.format("%Y-%m-%d")
        ),
        None => println!("Plan #{} started with {} at {}% APY", plan.id, plan.amount, plan.apy),
    }
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let user = sub.get_one::<String>("user").unwrap().trim();
    let data = list_plans(conn, user)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .into_iter()
            .map(|p| {
                vec![
                    p.id.to_string(),
                    p.plan_type.to_string(),
                    p.status.to_string(),
                    p.amount.to_string(),
                    format!("{:.8}", p.current_value),
                    format!("{}%", p.apy),
                    p.unlock_date
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "flexible".into()),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["ID", "Plan", "Status", "Principal", "Value", "APY", "Unlocks"],
                rows
            )
        );
    }
    Ok(())
}
