// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{Duration, TimeZone, Utc};
use cryptovest::commands::prices::{
    PriceOracle, StaticOracle, StoredOracle, last_known_price, refresh_prices, tracked_symbols,
};
use cryptovest::commands::wallets::credit_or_create;
use cryptovest::db::init_schema;
use cryptovest::error::{EngineError, EngineResult};
use rusqlite::Connection;
use rust_decimal::Decimal;

struct DownOracle;

impl PriceOracle for DownOracle {
    fn source(&self) -> &str {
        "down"
    }

    fn get_price(&self, symbol: &str) -> EngineResult<Decimal> {
        Err(EngineError::OracleUnavailable {
            symbol: symbol.to_string(),
            reason: "connection refused".into(),
        })
    }
}

fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}

#[test]
fn stored_oracle_falls_back_to_static_quotes() {
    let conn = setup();
    let oracle = StoredOracle::new(&conn);
    assert_eq!(oracle.get_price("BTC").unwrap(), Decimal::from(96_000));
    assert_eq!(oracle.get_price("usdt").unwrap(), Decimal::ONE);
    assert!(matches!(
        oracle.get_price("DOGE").unwrap_err(),
        EngineError::OracleUnavailable { .. }
    ));
}

#[test]
fn failed_refresh_keeps_last_known_price() {
    let conn = setup();
    let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
    let symbols = vec!["BTC".to_string(), "ETH".to_string()];

    let live = StaticOracle::new()
        .with_price("BTC", Decimal::from(101_000))
        .with_price("ETH", Decimal::from(3_500));
    assert_eq!(refresh_prices(&conn, &live, &symbols, t0).unwrap(), 2);

    let refreshed = refresh_prices(&conn, &DownOracle, &symbols, t0 + Duration::minutes(5)).unwrap();
    assert_eq!(refreshed, 0);
    assert_eq!(
        last_known_price(&conn, "BTC").unwrap(),
        Some(Decimal::from(101_000))
    );
    assert_eq!(
        StoredOracle::new(&conn).get_price("ETH").unwrap(),
        Decimal::from(3_500)
    );
}

#[test]
fn newest_quote_wins() {
    let conn = setup();
    let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
    let symbols = vec!["BTC".to_string()];
    let first = StaticOracle::new().with_price("BTC", Decimal::from(90_000));
    let second = StaticOracle::new().with_price("BTC", Decimal::from(95_000));
    refresh_prices(&conn, &first, &symbols, t0).unwrap();
    refresh_prices(&conn, &second, &symbols, t0 + Duration::hours(1)).unwrap();
    assert_eq!(
        last_known_price(&conn, "btc").unwrap(),
        Some(Decimal::from(95_000))
    );
}

#[test]
fn tracked_symbols_include_held_assets() {
    let conn = setup();
    let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
    credit_or_create(&conn, "alice", "SOLX", Decimal::ONE, t0).unwrap();
    let symbols = tracked_symbols(&conn).unwrap();
    assert!(symbols.contains(&"BTC".to_string()));
    assert!(symbols.contains(&"SOLX".to_string()));
}
