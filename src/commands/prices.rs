// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::utils::{http_client, pretty_table, row_decimal, ts};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};

/// Anything that can quote an asset in USD.
pub trait PriceOracle {
    fn source(&self) -> &str;
    fn get_price(&self, symbol: &str) -> EngineResult<Decimal>;
}

const COINGECKO_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("USDT", "tether"),
    ("BNB", "binancecoin"),
];

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("fetch", _)) => {
            let cfg = EngineConfig::load(conn)?;
            let oracle = CoinGeckoOracle::new(&cfg.coingecko_url)?;
            let symbols = tracked_symbols(conn)?;
            let refreshed = refresh_prices(conn, &oracle, &symbols, Utc::now())?;
            println!(
                "Refreshed {} of {} prices via {}",
                refreshed,
                symbols.len(),
                oracle.source()
            );
        }
        Some(("list", _)) => list_prices(conn)?,
        Some(("get", sub)) => {
            let symbol = sub.get_one::<String>("symbol").unwrap().trim().to_uppercase();
            let price = StoredOracle::new(conn).get_price(&symbol)?;
            println!("1 {} = {} USD", symbol, price);
        }
        _ => {}
    }
    Ok(())
}

/// Fixed quotes; also the fallback when nothing has been fetched yet.
#[derive(Debug, Clone)]
pub struct StaticOracle {
    prices: HashMap<String, Decimal>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    pub fn fallback() -> Self {
        Self::new()
            .with_price("BTC", Decimal::from(96_000))
            .with_price("ETH", Decimal::from(3_180))
            .with_price("USDT", Decimal::ONE)
            .with_price("BNB", Decimal::from(936))
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(symbol.to_uppercase(), price);
        self
    }
}

impl Default for StaticOracle {
    fn default() -> Self {
        Self::fallback()
    }
}

impl PriceOracle for StaticOracle {
    fn source(&self) -> &str {
        "static"
    }

    fn get_price(&self, symbol: &str) -> EngineResult<Decimal> {
        self.prices
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| EngineError::OracleUnavailable {
                symbol: symbol.to_string(),
                reason: "no static quote".into(),
            })
    }
}

pub struct CoinGeckoOracle {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl CoinGeckoOracle {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn coin_id(symbol: &str) -> Option<&'static str> {
        COINGECKO_IDS
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
            .map(|(_, id)| *id)
    }
}

impl PriceOracle for CoinGeckoOracle {
    fn source(&self) -> &str {
        "coingecko"
    }

    fn get_price(&self, symbol: &str) -> EngineResult<Decimal> {
        let unavailable = |reason: String| EngineError::OracleUnavailable {
            symbol: symbol.to_string(),
            reason,
        };
        let id = Self::coin_id(symbol).ok_or_else(|| unavailable("unsupported symbol".into()))?;
        let url = format!("{}/simple/price?ids={}&vs_currencies=usd", self.base_url, id);
        let body: HashMap<String, HashMap<String, f64>> = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| unavailable(e.to_string()))?;
        let usd = body
            .get(id)
            .and_then(|m| m.get("usd"))
            .copied()
            .ok_or_else(|| unavailable("missing usd quote".into()))?;
        let price = Decimal::try_from(usd).map_err(|e| unavailable(e.to_string()))?;
        if price <= Decimal::ZERO {
            return Err(unavailable(format!("non-positive quote {}", usd)));
        }
        Ok(price)
    }
}

/// Last-known cached price, falling back to the static table.
pub struct StoredOracle<'a> {
    conn: &'a Connection,
    fallback: StaticOracle,
}

impl<'a> StoredOracle<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            fallback: StaticOracle::fallback(),
        }
    }
}

impl PriceOracle for StoredOracle<'_> {
    fn source(&self) -> &str {
        "stored"
    }

    fn get_price(&self, symbol: &str) -> EngineResult<Decimal> {
        match last_known_price(self.conn, symbol)? {
            Some(p) => Ok(p),
            None => self.fallback.get_price(symbol),
        }
    }
}

pub fn last_known_price(conn: &Connection, symbol: &str) -> EngineResult<Option<Decimal>> {
    let p = conn
        .query_row(
            "SELECT price_usd FROM prices WHERE symbol=?1 ORDER BY fetched_at DESC, id DESC LIMIT 1",
            params![symbol.to_uppercase()],
            |r| row_decimal(r, 0),
        )
        .optional()?;
    Ok(p)
}

pub fn record_price(
    conn: &Connection,
    symbol: &str,
    price: Decimal,
    source: &str,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO prices(symbol, price_usd, source, fetched_at) VALUES (?1, ?2, ?3, ?4)",
        params![symbol.to_uppercase(), price.to_string(), source, ts(now)],
    )?;
    Ok(())
}

/// Symbols held in any wallet plus the ones the live feed knows about.
pub fn tracked_symbols(conn: &Connection) -> EngineResult<Vec<String>> {
    let mut out: Vec<String> = COINGECKO_IDS.iter().map(|(s, _)| s.to_string()).collect();
    let mut stmt = conn.prepare("SELECT DISTINCT asset_symbol FROM wallets ORDER BY asset_symbol")?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    for row in rows {
        let s = row?.to_uppercase();
        if !out.contains(&s) {
            out.push(s);
        }
    }
    Ok(out)
}

/// Polls `oracle` for each symbol and caches the quotes. A failed quote is
/// logged and skipped; readers keep using the last-known price.
pub fn refresh_prices(
    conn: &Connection,
    oracle: &dyn PriceOracle,
    symbols: &[String],
    now: DateTime<Utc>,
) -> EngineResult<usize> {
    let mut refreshed = 0;
    for symbol in symbols {
        match oracle.get_price(symbol) {
            Ok(price) => {
                record_price(conn, symbol, price, oracle.source(), now)?;
                refreshed += 1;
            }
            Err(e @ EngineError::OracleUnavailable { .. }) => {
                warn!(symbol = %symbol, error = %e, "price refresh failed, keeping last-known price");
            }
            Err(e) => return Err(e),
        }
    }
    info!(refreshed, requested = symbols.len(), source = oracle.source(), "prices refreshed");
    Ok(refreshed)
}

fn list_prices(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT symbol, price_usd, source, fetched_at FROM prices p
         WHERE id = (SELECT id FROM prices q WHERE q.symbol = p.symbol
                     ORDER BY fetched_at DESC, id DESC LIMIT 1)
         ORDER BY symbol",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
        ))
    })?;
    let mut data = Vec::new();
    for row in rows {
        let (s, p, src, at) = row?;
        data.push(vec![s, p, src, at]);
    }
    println!("{}", pretty_table(&["Symbol", "USD", "Source", "Fetched"], data));
    Ok(())
}
