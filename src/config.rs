// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Engine settings, persisted in the `settings` table with built-in defaults.

use anyhow::{Context, Result, anyhow};
use chrono::Duration;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::plans::MAX_TERM_MONTHS;
use crate::models::{PlanType, ProductTier};

pub const KEY_GRACE_MINUTES: &str = "deposit_grace_minutes";
pub const KEY_WINDOW_MINUTES: &str = "deposit_window_minutes";
pub const KEY_IDLE_MINUTES: &str = "idle_threshold_minutes";
pub const KEY_CATALOG: &str = "product_catalog";
pub const KEY_COINGECKO_URL: &str = "coingecko_url";

pub const KNOWN_KEYS: &[&str] = &[
    KEY_GRACE_MINUTES,
    KEY_WINDOW_MINUTES,
    KEY_IDLE_MINUTES,
    KEY_CATALOG,
    KEY_COINGECKO_URL,
];

const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Clone, Serialize)]
pub struct EngineConfig {
    /// Deposits younger than this are left for the user to invest manually.
    pub deposit_grace_minutes: i64,
    /// Deposits older than this are no longer considered by the sweep.
    pub deposit_window_minutes: i64,
    /// Wallets untouched for this long are swept into a plan.
    pub idle_threshold_minutes: i64,
    pub catalog: Vec<ProductTier>,
    pub coingecko_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deposit_grace_minutes: 2,
            deposit_window_minutes: 10,
            idle_threshold_minutes: 15,
            catalog: default_catalog(),
            coingecko_url: DEFAULT_COINGECKO_URL.to_string(),
        }
    }
}

pub fn default_catalog() -> Vec<ProductTier> {
    vec![
        ProductTier {
            plan_type: PlanType::ShortTerm,
            apy: Decimal::from(8),
            term_months: 2,
        },
        ProductTier {
            plan_type: PlanType::SemiAnnual,
            apy: Decimal::from(15),
            term_months: 6,
        },
        ProductTier {
            plan_type: PlanType::Annual,
            apy: Decimal::from(25),
            term_months: 12,
        },
    ]
}

impl EngineConfig {
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = get_setting(conn, KEY_GRACE_MINUTES)? {
            cfg.deposit_grace_minutes = parse_minutes(KEY_GRACE_MINUTES, &v)?;
        }
        if let Some(v) = get_setting(conn, KEY_WINDOW_MINUTES)? {
            cfg.deposit_window_minutes = parse_minutes(KEY_WINDOW_MINUTES, &v)?;
        }
        if let Some(v) = get_setting(conn, KEY_IDLE_MINUTES)? {
            cfg.idle_threshold_minutes = parse_minutes(KEY_IDLE_MINUTES, &v)?;
        }
        if let Some(v) = get_setting(conn, KEY_CATALOG)? {
            cfg.catalog = parse_catalog(&v)?;
        }
        if let Some(v) = get_setting(conn, KEY_COINGECKO_URL)? {
            cfg.coingecko_url = v;
        }
        if cfg.deposit_grace_minutes >= cfg.deposit_window_minutes {
            return Err(anyhow!(
                "{} ({}) must be smaller than {} ({})",
                KEY_GRACE_MINUTES,
                cfg.deposit_grace_minutes,
                KEY_WINDOW_MINUTES,
                cfg.deposit_window_minutes
            ));
        }
        Ok(cfg)
    }

    pub fn grace(&self) -> Duration {
        Duration::minutes(self.deposit_grace_minutes)
    }

    pub fn window(&self) -> Duration {
        Duration::minutes(self.deposit_window_minutes)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::minutes(self.idle_threshold_minutes)
    }

    /// Tier with the shortest lock; used for post-approval auto-invest.
    pub fn shortest_tier(&self) -> Option<&ProductTier> {
        self.catalog.iter().min_by_key(|t| t.term_months)
    }

    pub fn tier(&self, plan_type: PlanType) -> Option<&ProductTier> {
        self.catalog.iter().find(|t| t.plan_type == plan_type)
    }
}

fn parse_minutes(key: &str, v: &str) -> Result<i64> {
    let m: i64 = v
        .trim()
        .parse()
        .with_context(|| format!("Invalid minutes '{}' for {}", v, key))?;
    if m < 0 {
        return Err(anyhow!("{} must not be negative", key));
    }
    Ok(m)
}

pub fn parse_catalog(v: &str) -> Result<Vec<ProductTier>> {
    let tiers: Vec<ProductTier> =
        serde_json::from_str(v).with_context(|| format!("Invalid {} JSON", KEY_CATALOG))?;
    if tiers.is_empty() {
        return Err(anyhow!("{} must list at least one tier", KEY_CATALOG));
    }
    if let Some(t) = tiers.iter().find(|t| t.apy.is_sign_negative()) {
        return Err(anyhow!("Tier {} has a negative APY", t.plan_type));
    }
    if let Some(t) = tiers.iter().find(|t| t.term_months > MAX_TERM_MONTHS) {
        return Err(anyhow!(
            "Tier {} term of {} months exceeds the maximum of {}",
            t.plan_type,
            t.term_months,
            MAX_TERM_MONTHS
        ));
    }
    Ok(tiers)
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let v: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key=?1", params![key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(v)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        return Err(anyhow!(
            "Unknown setting '{}' (known: {})",
            key,
            KNOWN_KEYS.join(", ")
        ));
    }
    // Reject anything `load` would fail to parse.
    match key {
        KEY_CATALOG => {
            parse_catalog(value)?;
        }
        KEY_COINGECKO_URL => {}
        _ => {
            parse_minutes(key, value)?;
        }
    }
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}
