// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Cryptovest", "cryptovest"));

/// Environment override for the ledger location.
pub const DB_ENV: &str = "CRYPTOVEST_DB";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn db_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(DB_ENV) {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("cryptovest.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    let path = db_path()?;
    open_at(&path)
}

pub fn open_at(path: &Path) -> Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    init_schema(&conn)?;
    debug!(path = %path.display(), "ledger opened");
    Ok(conn)
}

/// Starts a write transaction that holds the database write lock from the
/// first statement, so concurrent writers serialize instead of racing.
pub fn write_tx(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS wallets(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        asset_symbol TEXT NOT NULL,
        asset_name TEXT NOT NULL,
        balance TEXT NOT NULL DEFAULT '0',
        wallet_address TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(user_id, asset_symbol)
    );
    CREATE INDEX IF NOT EXISTS idx_wallets_updated ON wallets(updated_at);

    CREATE TABLE IF NOT EXISTS investment_plans(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        wallet_id INTEGER NOT NULL,
        plan_type TEXT NOT NULL,
        amount TEXT NOT NULL,
        apy TEXT NOT NULL,
        term_months INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL CHECK(status IN ('active','locked','completed')),
        start_date TEXT NOT NULL,
        unlock_date TEXT,
        current_value TEXT NOT NULL,
        last_gain_calculated TEXT NOT NULL,
        matured_at TEXT,
        completed_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(wallet_id) REFERENCES wallets(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_plans_user ON investment_plans(user_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_plans_status ON investment_plans(status);

    CREATE TABLE IF NOT EXISTS transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        type TEXT NOT NULL,
        asset_symbol TEXT NOT NULL,
        amount TEXT NOT NULL,
        status TEXT NOT NULL CHECK(status IN ('pending','approved','completed','rejected')),
        fee TEXT NOT NULL DEFAULT '0',
        price_usd TEXT,
        tx_hash TEXT,
        wallet_address TEXT,
        created_by TEXT,
        approved_by TEXT,
        approved_at TEXT,
        notes TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(type, status, approved_at);

    CREATE TABLE IF NOT EXISTS notifications(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        type TEXT NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        read INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);

    CREATE TABLE IF NOT EXISTS user_balances(
        user_id TEXT PRIMARY KEY,
        deposit_balance TEXT NOT NULL DEFAULT '0',
        profit_balance TEXT NOT NULL DEFAULT '0',
        total_bonus TEXT NOT NULL DEFAULT '0',
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS coin_swaps(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        from_wallet_id INTEGER NOT NULL,
        to_wallet_id INTEGER NOT NULL,
        from_symbol TEXT NOT NULL,
        to_symbol TEXT NOT NULL,
        from_amount TEXT NOT NULL,
        to_amount TEXT NOT NULL,
        exchange_rate TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'completed',
        created_at TEXT NOT NULL,
        FOREIGN KEY(from_wallet_id) REFERENCES wallets(id),
        FOREIGN KEY(to_wallet_id) REFERENCES wallets(id)
    );

    -- Last-known USD prices; newest row per symbol wins
    CREATE TABLE IF NOT EXISTS prices(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        price_usd TEXT NOT NULL,
        source TEXT NOT NULL,
        fetched_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_prices_symbol ON prices(symbol, fetched_at);
    "#,
    )?;
    Ok(())
}
