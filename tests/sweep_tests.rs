// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Duration, TimeZone, Utc};
use cryptovest::commands::admin::approve_deposit;
use cryptovest::commands::notifications::list_notifications;
use cryptovest::commands::plans::{PlanOrigin, PlanRequest, create_plan, list_plans};
use cryptovest::commands::sweep::{SweepReport, run_auto_invest};
use cryptovest::commands::wallets::{credit_or_create, find_wallet, get_wallet, request_deposit};
use cryptovest::config::{EngineConfig, default_catalog};
use cryptovest::db::init_schema;
use cryptovest::models::{PlanStatus, PlanType};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}

fn tick(conn: &mut Connection, at: DateTime<Utc>) -> SweepReport {
    let mut rng = StdRng::seed_from_u64(7);
    run_auto_invest(conn, &EngineConfig::default(), at, &mut rng).unwrap()
}

/// Deposit requested and approved at `at`; returns the credited wallet id.
fn approved_usdt_deposit(conn: &mut Connection, user: &str, amount: &str, at: DateTime<Utc>) -> i64 {
    let tx_id = request_deposit(conn, user, "USDT", d(amount), None, at).unwrap();
    approve_deposit(conn, tx_id, "admin-1", at).unwrap().id
}

#[test]
fn idle_wallet_is_swept_into_a_catalog_tier() {
    let mut conn = setup();
    let w = credit_or_create(&conn, "alice", "BTC", d("0.5"), t0()).unwrap();

    let report = tick(&mut conn, t0() + Duration::minutes(16));
    assert_eq!(report.wallets_processed, 1);
    assert_eq!(report.deposits_processed, 0);
    assert_eq!(report.failures, 0);

    assert_eq!(get_wallet(&conn, w.id).unwrap().balance, Decimal::ZERO);
    let plans = list_plans(&conn, "alice").unwrap();
    assert_eq!(plans.len(), 1);
    let plan = &plans[0];
    assert_eq!(plan.amount, d("0.5"));
    assert_eq!(plan.wallet_id, w.id);
    assert_eq!(plan.status, PlanStatus::Locked);
    let tier = default_catalog()
        .into_iter()
        .find(|t| t.plan_type == plan.plan_type)
        .expect("plan type from the catalog");
    assert_eq!(plan.apy, tier.apy);
    assert_eq!(plan.term_months, tier.term_months);

    let notes = list_notifications(&conn, "alice", false).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Auto Investment Created");
}

#[test]
fn second_tick_finds_nothing_left() {
    let mut conn = setup();
    credit_or_create(&conn, "alice", "BTC", d("0.5"), t0()).unwrap();

    assert_eq!(tick(&mut conn, t0() + Duration::minutes(16)).total(), 1);
    assert_eq!(tick(&mut conn, t0() + Duration::minutes(40)).total(), 0);
    assert_eq!(list_plans(&conn, "alice").unwrap().len(), 1);
}

#[test]
fn recently_touched_wallet_is_not_idle() {
    let mut conn = setup();
    let w = credit_or_create(&conn, "alice", "BTC", d("0.5"), t0()).unwrap();

    assert_eq!(tick(&mut conn, t0() + Duration::minutes(10)), SweepReport::default());
    assert_eq!(get_wallet(&conn, w.id).unwrap().balance, d("0.5"));
}

#[test]
fn approved_deposit_goes_into_shortest_tier_after_grace() {
    let mut conn = setup();
    let wallet_id = approved_usdt_deposit(&mut conn, "alice", "500", t0());

    // Still inside the grace period.
    assert_eq!(tick(&mut conn, t0() + Duration::minutes(1)).total(), 0);

    let at = t0() + Duration::minutes(3);
    let report = tick(&mut conn, at);
    assert_eq!(report.deposits_processed, 1);
    assert_eq!(report.wallets_processed, 0);

    let plans = list_plans(&conn, "alice").unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].plan_type, PlanType::ShortTerm);
    assert_eq!(plans[0].amount, d("500"));
    assert_eq!(plans[0].term_months, 2);
    assert_eq!(plans[0].unlock_date, Some(at + Duration::days(60)));
    assert_eq!(get_wallet(&conn, wallet_id).unwrap().balance, Decimal::ZERO);

    assert_eq!(tick(&mut conn, t0() + Duration::minutes(5)).total(), 0);
    assert_eq!(list_plans(&conn, "alice").unwrap().len(), 1);
}

#[test]
fn deposit_is_left_alone_when_user_already_invested() {
    let mut conn = setup();
    let wallet_id = approved_usdt_deposit(&mut conn, "alice", "500", t0());
    let req = PlanRequest {
        user_id: "alice",
        wallet_id,
        plan_type: PlanType::FlexibleEarn,
        amount: d("100"),
        apy: d("5"),
        term_months: 0,
    };
    create_plan(&mut conn, &req, PlanOrigin::User, t0() + Duration::minutes(1)).unwrap();

    assert_eq!(tick(&mut conn, t0() + Duration::minutes(3)).total(), 0);
    assert_eq!(get_wallet(&conn, wallet_id).unwrap().balance, d("400"));
    assert_eq!(list_plans(&conn, "alice").unwrap().len(), 1);
}

#[test]
fn deposit_past_the_window_is_ignored_by_the_deposit_pass() {
    let mut conn = setup();
    let wallet_id = approved_usdt_deposit(&mut conn, "alice", "500", t0());

    let report = tick(&mut conn, t0() + Duration::minutes(11));
    assert_eq!(report.deposits_processed, 0);
    assert_eq!(report.wallets_processed, 0);
    assert_eq!(get_wallet(&conn, wallet_id).unwrap().balance, d("500"));

    // Once idle long enough the wallet pass picks it up instead.
    let report = tick(&mut conn, t0() + Duration::minutes(16));
    assert_eq!(report.wallets_processed, 1);
    assert!(find_wallet(&conn, "alice", "USDT").unwrap().unwrap().balance.is_zero());
}

#[test]
fn one_users_failure_does_not_stop_the_others() {
    let mut conn = setup();
    approved_usdt_deposit(&mut conn, "alice", "500", t0());
    approved_usdt_deposit(&mut conn, "bob", "250", t0());
    // Alice's wallet disappears between approval and the tick.
    conn.execute("DELETE FROM wallets WHERE user_id='alice'", []).unwrap();

    let report = tick(&mut conn, t0() + Duration::minutes(3));
    assert_eq!(report.failures, 1);
    assert_eq!(report.deposits_processed, 1);
    assert_eq!(list_plans(&conn, "bob").unwrap().len(), 1);
}

#[test]
fn custom_windows_are_honoured() {
    let mut conn = setup();
    approved_usdt_deposit(&mut conn, "alice", "500", t0());
    let cfg = EngineConfig {
        deposit_grace_minutes: 5,
        deposit_window_minutes: 30,
        ..EngineConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(1);

    let early = run_auto_invest(&mut conn, &cfg, t0() + Duration::minutes(3), &mut rng).unwrap();
    assert_eq!(early.total(), 0);
    let late = run_auto_invest(&mut conn, &cfg, t0() + Duration::minutes(6), &mut rng).unwrap();
    assert_eq!(late.deposits_processed, 1);
}
