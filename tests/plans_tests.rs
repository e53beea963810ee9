// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Duration, TimeZone, Utc};
use cryptovest::commands::balances::get_user_balance;
use cryptovest::commands::notifications::list_notifications;
use cryptovest::commands::plans::{
    Maturity, PlanOrigin, PlanRequest, accrue, create_plan, get_plan, list_plans, maturity_check,
    withdraw_plan,
};
use cryptovest::commands::transactions::{TransactionFilter, query_transactions};
use cryptovest::commands::wallets::{credit_or_create, get_wallet};
use cryptovest::db::init_schema;
use cryptovest::error::EngineError;
use cryptovest::models::{PlanStatus, PlanType, TxType};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn setup() -> (Connection, i64) {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    let w = credit_or_create(&conn, "alice", "BTC", d("1"), t0()).unwrap();
    (conn, w.id)
}

fn request(wallet_id: i64, amount: &str, apy: &str, term_months: u32) -> PlanRequest<'static> {
    PlanRequest {
        user_id: "alice",
        wallet_id,
        plan_type: if term_months == 0 {
            PlanType::FlexibleEarn
        } else {
            PlanType::FixedTerm
        },
        amount: d(amount),
        apy: d(apy),
        term_months,
    }
}

fn daily_rate(apy: &str) -> Decimal {
    d(apy) / Decimal::ONE_HUNDRED / Decimal::from(365)
}

#[test]
fn create_plan_moves_principal_out_of_wallet() {
    let (mut conn, wallet_id) = setup();
    let plan = create_plan(&mut conn, &request(wallet_id, "0.4", "8", 2), PlanOrigin::User, t0()).unwrap();

    assert_eq!(plan.status, PlanStatus::Locked);
    assert_eq!(plan.amount, d("0.4"));
    assert_eq!(plan.current_value, d("0.4"));
    assert_eq!(plan.unlock_date, Some(t0() + Duration::days(60)));
    assert_eq!(plan.last_gain_calculated, t0());

    let wallet = get_wallet(&conn, wallet_id).unwrap();
    assert_eq!(wallet.balance, d("0.6"));
    assert_eq!(wallet.balance + plan.current_value, d("1"));

    let ledger = query_transactions(
        &conn,
        &TransactionFilter {
            r#type: Some(TxType::Investment),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].amount, d("0.4"));

    let notes = list_notifications(&conn, "alice", true).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Investment Plan Created");
}

#[test]
fn create_plan_rejects_overdraw_and_leaves_wallet_untouched() {
    let (mut conn, wallet_id) = setup();
    let err = create_plan(&mut conn, &request(wallet_id, "2", "8", 2), PlanOrigin::User, t0())
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance { .. }));

    assert_eq!(get_wallet(&conn, wallet_id).unwrap().balance, d("1"));
    assert!(list_plans(&conn, "alice").unwrap().is_empty());
    assert!(list_notifications(&conn, "alice", false).unwrap().is_empty());
}

#[test]
fn create_plan_validates_amount_and_owner() {
    let (mut conn, wallet_id) = setup();
    let err = create_plan(&mut conn, &request(wallet_id, "0", "8", 2), PlanOrigin::User, t0())
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    let mut req = request(wallet_id, "0.1", "8", 2);
    req.user_id = "mallory";
    let err = create_plan(&mut conn, &req, PlanOrigin::User, t0()).unwrap_err();
    assert!(matches!(err, EngineError::NotOwner { .. }));
    assert_eq!(get_wallet(&conn, wallet_id).unwrap().balance, d("1"));
}

#[test]
fn flexible_plan_withdraws_any_time_with_prorated_gain() {
    let (mut conn, wallet_id) = setup();
    let plan = create_plan(&mut conn, &request(wallet_id, "0.4", "8", 0), PlanOrigin::User, t0()).unwrap();
    assert_eq!(plan.status, PlanStatus::Active);
    assert_eq!(plan.unlock_date, None);

    let settled = withdraw_plan(&mut conn, plan.id, "alice", t0() + Duration::days(1)).unwrap();
    let expected = d("0.4") + d("0.4") * daily_rate("8") * Decimal::ONE;
    assert_eq!(settled, expected);

    let wallet = get_wallet(&conn, wallet_id).unwrap();
    assert_eq!(wallet.balance, d("0.6") + expected);

    let plan = get_plan(&conn, plan.id).unwrap();
    assert_eq!(plan.status, PlanStatus::Completed);
    assert_eq!(plan.completed_at, Some(t0() + Duration::days(1)));
}

#[test]
fn locked_plan_refuses_early_withdrawal_then_settles_at_capped_value() {
    let (mut conn, wallet_id) = setup();
    let plan = create_plan(&mut conn, &request(wallet_id, "0.5", "15", 6), PlanOrigin::User, t0()).unwrap();

    let err = withdraw_plan(&mut conn, plan.id, "alice", t0() + Duration::days(10)).unwrap_err();
    match err {
        EngineError::StillLocked { plan_id, unlock_date } => {
            assert_eq!(plan_id, plan.id);
            assert_eq!(unlock_date, t0() + Duration::days(180));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(get_wallet(&conn, wallet_id).unwrap().balance, d("0.5"));

    let settled = withdraw_plan(&mut conn, plan.id, "alice", t0() + Duration::days(181)).unwrap();
    let expected = d("0.5") + d("0.5") * daily_rate("15") * Decimal::from(180);
    assert_eq!(settled, expected);
    assert_eq!(get_wallet(&conn, wallet_id).unwrap().balance, d("0.5") + expected);

    let err = withdraw_plan(&mut conn, plan.id, "alice", t0() + Duration::days(182)).unwrap_err();
    assert!(matches!(err, EngineError::PlanCompleted(id) if id == plan.id));

    let returns = query_transactions(
        &conn,
        &TransactionFilter {
            r#type: Some(TxType::InvestmentReturn),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].amount, expected);
}

#[test]
fn withdraw_by_another_user_is_refused() {
    let (mut conn, wallet_id) = setup();
    let plan = create_plan(&mut conn, &request(wallet_id, "0.5", "8", 0), PlanOrigin::User, t0()).unwrap();
    let err = withdraw_plan(&mut conn, plan.id, "bob", t0() + Duration::days(1)).unwrap_err();
    assert!(matches!(err, EngineError::NotOwner { .. }));
    assert_eq!(get_plan(&conn, plan.id).unwrap().status, PlanStatus::Active);
}

#[test]
fn accrual_is_monotonic_and_idempotent() {
    let (mut conn, wallet_id) = setup();
    let plan = create_plan(&mut conn, &request(wallet_id, "1", "25", 12), PlanOrigin::User, t0()).unwrap();

    let g1 = accrue(&mut conn, plan.id, t0() + Duration::days(10)).unwrap();
    assert!(g1 > Decimal::ZERO);
    let v1 = get_plan(&conn, plan.id).unwrap().current_value;
    assert_eq!(v1, d("1") + g1);

    let g2 = accrue(&mut conn, plan.id, t0() + Duration::days(20)).unwrap();
    let after = get_plan(&conn, plan.id).unwrap();
    assert!(after.current_value >= v1);
    assert_eq!(after.current_value, v1 + g2);
    assert_eq!(after.last_gain_calculated, t0() + Duration::days(20));

    // Same instant again, and an earlier one, add nothing.
    assert_eq!(accrue(&mut conn, plan.id, t0() + Duration::days(20)).unwrap(), Decimal::ZERO);
    assert_eq!(accrue(&mut conn, plan.id, t0() + Duration::days(15)).unwrap(), Decimal::ZERO);
    assert_eq!(get_plan(&conn, plan.id).unwrap().current_value, after.current_value);
}

#[test]
fn locked_plan_stops_accruing_at_unlock() {
    let (mut conn, wallet_id) = setup();
    let plan = create_plan(&mut conn, &request(wallet_id, "1", "8", 2), PlanOrigin::User, t0()).unwrap();

    accrue(&mut conn, plan.id, t0() + Duration::days(100)).unwrap();
    let p = get_plan(&conn, plan.id).unwrap();
    assert_eq!(p.last_gain_calculated, t0() + Duration::days(60));
    assert_eq!(p.current_value, d("1") + d("1") * daily_rate("8") * Decimal::from(60));

    assert_eq!(accrue(&mut conn, plan.id, t0() + Duration::days(200)).unwrap(), Decimal::ZERO);
}

#[test]
fn maturity_is_detected_once_and_keeps_plan_locked() {
    let (mut conn, wallet_id) = setup();
    let locked = create_plan(&mut conn, &request(wallet_id, "0.5", "8", 2), PlanOrigin::User, t0()).unwrap();
    let flexible = create_plan(&mut conn, &request(wallet_id, "0.1", "8", 0), PlanOrigin::User, t0()).unwrap();

    assert_eq!(
        maturity_check(&mut conn, locked.id, t0() + Duration::days(30)).unwrap(),
        Maturity::Locked {
            unlock_date: t0() + Duration::days(60)
        }
    );
    assert_eq!(
        maturity_check(&mut conn, locked.id, t0() + Duration::days(61)).unwrap(),
        Maturity::Matured
    );
    assert_eq!(
        maturity_check(&mut conn, locked.id, t0() + Duration::days(62)).unwrap(),
        Maturity::AlreadyMatured
    );
    assert_eq!(
        maturity_check(&mut conn, flexible.id, t0() + Duration::days(62)).unwrap(),
        Maturity::Open
    );

    let p = get_plan(&conn, locked.id).unwrap();
    assert_eq!(p.status, PlanStatus::Locked);
    assert_eq!(p.matured_at, Some(t0() + Duration::days(61)));

    let unlocked = list_notifications(&conn, "alice", false)
        .unwrap()
        .into_iter()
        .filter(|n| n.title == "Investment Unlocked")
        .count();
    assert_eq!(unlocked, 1);
}

#[test]
fn plan_not_found_is_reported() {
    let (mut conn, _) = setup();
    assert!(matches!(
        accrue(&mut conn, 42, t0()).unwrap_err(),
        EngineError::PlanNotFound(42)
    ));
}

fn usdt_request(wallet_id: i64, amount: Decimal, apy: &str, term_months: u32) -> PlanRequest<'static> {
    PlanRequest {
        amount,
        ..request(wallet_id, "1", apy, term_months)
    }
}

#[test]
fn thousand_usdt_six_month_lock_pays_fifteen_percent_prorated() {
    let mut conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    let w = credit_or_create(&conn, "alice", "USDT", d("1000"), t0()).unwrap();
    let plan = create_plan(
        &mut conn,
        &usdt_request(w.id, d("1000"), "15", 6),
        PlanOrigin::User,
        t0(),
    )
    .unwrap();
    assert_eq!(get_wallet(&conn, w.id).unwrap().balance, Decimal::ZERO);

    let err = withdraw_plan(&mut conn, plan.id, "alice", t0() + Duration::days(10)).unwrap_err();
    assert!(matches!(err, EngineError::StillLocked { .. }));

    let settled = withdraw_plan(&mut conn, plan.id, "alice", t0() + Duration::days(181)).unwrap();
    let expected = d("1000") + d("1000") * daily_rate("15") * Decimal::from(180);
    assert_eq!(settled, expected);
    assert_eq!(get_wallet(&conn, w.id).unwrap().balance, expected);
}

#[test]
fn accrual_and_withdrawal_book_profit_and_announce_it() {
    let mut conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    let w = credit_or_create(&conn, "alice", "USDT", d("500"), t0()).unwrap();
    let plan = create_plan(
        &mut conn,
        &usdt_request(w.id, d("500"), "8", 0),
        PlanOrigin::User,
        t0(),
    )
    .unwrap();

    let g1 = accrue(&mut conn, plan.id, t0() + Duration::days(10)).unwrap();
    assert!(g1 > Decimal::ZERO);
    // USDT is quoted at 1 USD.
    assert_eq!(get_user_balance(&conn, "alice").unwrap().profit_balance, g1);

    let settled = withdraw_plan(&mut conn, plan.id, "alice", t0() + Duration::days(20)).unwrap();
    let profit = get_user_balance(&conn, "alice").unwrap().profit_balance;
    assert!((profit - (settled - d("500"))).abs() < Decimal::new(1, 12));

    let earned = list_notifications(&conn, "alice", false)
        .unwrap()
        .into_iter()
        .filter(|n| n.title == "Profit Earned")
        .count();
    assert_eq!(earned, 2);

    // Nothing left to accrue, so no further profit or notice.
    assert_eq!(accrue(&mut conn, plan.id, t0() + Duration::days(30)).unwrap(), Decimal::ZERO);
    assert_eq!(get_user_balance(&conn, "alice").unwrap().profit_balance, profit);
}

#[test]
fn accrual_overflow_is_rejected_and_leaves_plan_untouched() {
    let mut conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    let w = credit_or_create(&conn, "alice", "USDT", Decimal::MAX, t0()).unwrap();
    let plan = create_plan(
        &mut conn,
        &usdt_request(w.id, Decimal::MAX, "8", 0),
        PlanOrigin::User,
        t0(),
    )
    .unwrap();

    let err = accrue(&mut conn, plan.id, t0() + Duration::days(10)).unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));
    let p = get_plan(&conn, plan.id).unwrap();
    assert_eq!(p.current_value, Decimal::MAX);
    assert_eq!(p.last_gain_calculated, t0());
    assert_eq!(get_user_balance(&conn, "alice").unwrap().profit_balance, Decimal::ZERO);
}
