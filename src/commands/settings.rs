// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::{EngineConfig, KNOWN_KEYS, get_setting, set_setting};
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("show", sub)) => {
            let cfg = EngineConfig::load(conn)?;
            if !maybe_print_json(sub.get_flag("json"), false, &cfg)? {
                let mut rows = Vec::new();
                for key in KNOWN_KEYS {
                    let stored = get_setting(conn, key)?;
                    let source = if stored.is_some() { "stored" } else { "default" };
                    let value = match *key {
                        crate::config::KEY_CATALOG => cfg
                            .catalog
                            .iter()
                            .map(|t| t.label())
                            .collect::<Vec<_>>()
                            .join("\n"),
                        _ => stored.unwrap_or_else(|| default_text(&cfg, key)),
                    };
                    rows.push(vec![key.to_string(), value, source.to_string()]);
                }
                println!("{}", pretty_table(&["Key", "Value", "Source"], rows));
            }
        }
        Some(("set", sub)) => {
            let key = sub.get_one::<String>("key").unwrap().trim();
            let value = sub.get_one::<String>("value").unwrap().trim();
            let tx = conn.unchecked_transaction()?;
            set_setting(&tx, key, value)?;
            // A valid value can still break the grace/window ordering.
            EngineConfig::load(&tx)?;
            tx.commit()?;
            info!(key, value, "setting updated");
            println!("Set {} = {}", key, value);
        }
        _ => {}
    }
    Ok(())
}

fn default_text(cfg: &EngineConfig, key: &str) -> String {
    match key {
        crate::config::KEY_GRACE_MINUTES => cfg.deposit_grace_minutes.to_string(),
        crate::config::KEY_WINDOW_MINUTES => cfg.deposit_window_minutes.to_string(),
        crate::config::KEY_IDLE_MINUTES => cfg.idle_threshold_minutes.to_string(),
        crate::config::KEY_COINGECKO_URL => cfg.coingecko_url.clone(),
        _ => String::new(),
    }
}
