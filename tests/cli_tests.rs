// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{TimeZone, Utc};
use cryptovest::commands::doctor::run_checks;
use cryptovest::commands::plans::list_plans;
use cryptovest::commands::wallets::credit_or_create;
use cryptovest::commands::{exporter, plans, settings};
use cryptovest::config::{EngineConfig, KEY_CATALOG, KEY_GRACE_MINUTES, set_setting};
use cryptovest::db::init_schema;
use cryptovest::models::PlanType;
use cryptovest::cli;
use rusqlite::Connection;
use rust_decimal::Decimal;
use tempfile::tempdir;

fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}

#[test]
fn config_defaults_and_overrides() {
    let conn = setup();
    let cfg = EngineConfig::load(&conn).unwrap();
    assert_eq!(cfg.deposit_grace_minutes, 2);
    assert_eq!(cfg.deposit_window_minutes, 10);
    assert_eq!(cfg.idle_threshold_minutes, 15);
    assert_eq!(cfg.shortest_tier().unwrap().plan_type, PlanType::ShortTerm);

    set_setting(
        &conn,
        KEY_CATALOG,
        r#"[{"plan_type":"annual","apy":"20","term_months":12},
            {"plan_type":"fixed-term","apy":"4","term_months":1}]"#,
    )
    .unwrap();
    let cfg = EngineConfig::load(&conn).unwrap();
    assert_eq!(cfg.catalog.len(), 2);
    assert_eq!(cfg.shortest_tier().unwrap().plan_type, PlanType::FixedTerm);
    assert_eq!(cfg.tier(PlanType::Annual).unwrap().apy, Decimal::from(20));
}

#[test]
fn config_rejects_bad_values() {
    let conn = setup();
    assert!(set_setting(&conn, "base_currency", "USD").is_err());
    assert!(set_setting(&conn, KEY_GRACE_MINUTES, "soon").is_err());
    assert!(set_setting(&conn, KEY_GRACE_MINUTES, "-1").is_err());
    assert!(set_setting(&conn, KEY_CATALOG, "[]").is_err());
    assert!(
        set_setting(
            &conn,
            KEY_CATALOG,
            r#"[{"plan_type":"annual","apy":"20","term_months":121}]"#,
        )
        .is_err()
    );
    assert!(
        set_setting(
            &conn,
            KEY_CATALOG,
            r#"[{"plan_type":"annual","apy":"20","term_months":120}]"#,
        )
        .is_ok()
    );
}

#[test]
fn config_set_refuses_grace_longer_than_window() {
    let conn = setup();
    let matches = cli::build_cli().get_matches_from([
        "cryptovest",
        "config",
        "set",
        "--key",
        "deposit_grace_minutes",
        "--value",
        "30",
    ]);
    if let Some(("config", config_m)) = matches.subcommand() {
        assert!(settings::handle(&conn, config_m).is_err());
    } else {
        panic!("config command not parsed");
    }
    assert_eq!(EngineConfig::load(&conn).unwrap().deposit_grace_minutes, 2);
}

#[test]
fn plan_create_defaults_to_catalog_terms() {
    let mut conn = setup();
    let w = credit_or_create(&conn, "alice", "ETH", Decimal::from(3), Utc::now()).unwrap();
    let wallet = w.id.to_string();

    let matches = cli::build_cli().get_matches_from([
        "cryptovest", "plan", "create", "--user", "alice", "--wallet", &wallet, "--type",
        "annual", "--amount", "1.5",
    ]);
    if let Some(("plan", plan_m)) = matches.subcommand() {
        plans::handle(&mut conn, plan_m).unwrap();
    } else {
        panic!("plan command not parsed");
    }

    let created = list_plans(&conn, "alice").unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].apy, Decimal::from(25));
    assert_eq!(created[0].term_months, 12);
    assert_eq!(created[0].amount, Decimal::new(15, 1));
}

#[test]
fn unknown_plan_type_is_an_error() {
    let mut conn = setup();
    let matches = cli::build_cli().get_matches_from([
        "cryptovest", "plan", "create", "--user", "alice", "--wallet", "1", "--type", "moonshot",
        "--amount", "1",
    ]);
    if let Some(("plan", plan_m)) = matches.subcommand() {
        assert!(plans::handle(&mut conn, plan_m).is_err());
    } else {
        panic!("plan command not parsed");
    }
}

#[test]
fn export_transactions_writes_json() {
    let conn = setup();
    let t0 = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
    cryptovest::commands::wallets::request_deposit(
        &conn,
        "alice",
        "BTC",
        Decimal::new(25, 2),
        None,
        t0,
    )
    .unwrap();

    let dir = tempdir().unwrap();
    let out_path = dir.path().join("export.json");
    let out_str = out_path.to_string_lossy().to_string();
    let matches = cli::build_cli().get_matches_from([
        "cryptovest",
        "export",
        "transactions",
        "--format",
        "json",
        "--out",
        &out_str,
    ]);
    if let Some(("export", export_m)) = matches.subcommand() {
        exporter::handle(&conn, export_m).unwrap();
    } else {
        panic!("no export subcommand");
    }

    let contents = std::fs::read_to_string(&out_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    let rows = parsed.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["type"], "deposit");
    assert_eq!(rows[0]["status"], "pending");
    assert_eq!(rows[0]["amount"], "0.25");
    assert_eq!(rows[0]["user_id"], "alice");
}

#[test]
fn export_rejects_unknown_format() {
    let conn = setup();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("export.xml");
    let out_str = out_path.to_string_lossy().to_string();
    let matches = cli::build_cli().get_matches_from([
        "cryptovest",
        "export",
        "plans",
        "--format",
        "xml",
        "--out",
        &out_str,
    ]);
    if let Some(("export", export_m)) = matches.subcommand() {
        assert!(exporter::handle(&conn, export_m).is_err());
    } else {
        panic!("no export subcommand");
    }
    assert!(!out_path.exists());
}

#[test]
fn doctor_reports_broken_rows() {
    let conn = setup();
    assert!(run_checks(&conn).unwrap().is_empty());

    conn.execute_batch(
        "INSERT INTO wallets(user_id, asset_symbol, asset_name, balance, created_at, updated_at)
         VALUES ('alice', 'BTC', 'Bitcoin', '-0.5', '2025-01-01T00:00:00.000000Z', '2025-01-01T00:00:00.000000Z');
         INSERT INTO wallets(user_id, asset_symbol, asset_name, balance, created_at, updated_at)
         VALUES ('bob', 'ETH', 'Ethereum', 'lots', '2025-01-01T00:00:00.000000Z', '2025-01-01T00:00:00.000000Z');
         INSERT INTO investment_plans(user_id, wallet_id, plan_type, amount, apy, term_months, status,
                                      start_date, unlock_date, current_value, last_gain_calculated,
                                      created_at, updated_at)
         VALUES ('bob', 1, 'annual', '1', '25', 12, 'locked', '2025-01-01T00:00:00.000000Z', NULL,
                 '0.9', '2025-01-01T00:00:00.000000Z', '2025-01-01T00:00:00.000000Z',
                 '2025-01-01T00:00:00.000000Z');",
    )
    .unwrap();

    let kinds: Vec<&str> = run_checks(&conn).unwrap().iter().map(|i| i.kind).collect();
    assert!(kinds.contains(&"negative_balance"));
    assert!(kinds.contains(&"corrupt_decimal"));
    assert!(kinds.contains(&"plan_owner_mismatch"));
    assert!(kinds.contains(&"value_below_principal"));
    assert!(kinds.contains(&"locked_without_unlock_date"));
}
