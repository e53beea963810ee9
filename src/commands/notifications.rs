// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::EngineResult;
use crate::models::Notification;
use crate::utils::{maybe_print_json, pretty_table, ts};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::debug;

pub const KIND_INVESTMENT: &str = "investment";
pub const KIND_DEPOSIT: &str = "deposit";
pub const KIND_WITHDRAWAL: &str = "withdrawal";
pub const KIND_SWAP: &str = "swap";

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("list", sub)) => list(conn, sub)?,
        Some(("read", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            let user = sub.get_one::<String>("user").unwrap().trim();
            if mark_read(conn, id, user)? {
                println!("Notification {} marked as read", id);
            } else {
                return Err(anyhow!("Notification {} not found for {}", id, user));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Records a message for `user_id`. Runs on whatever connection or open
/// transaction it is given, so callers can make it part of their unit of work.
pub fn create_notification(
    conn: &Connection,
    user_id: &str,
    kind: &str,
    title: &str,
    message: &str,
    now: DateTime<Utc>,
) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO notifications(user_id, type, title, message, read, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![user_id, kind, title, message, ts(now)],
    )?;
    let id = conn.last_insert_rowid();
    debug!(user_id, kind, id, "notification created");
    Ok(id)
}

pub fn list_notifications(
    conn: &Connection,
    user_id: &str,
    unread_only: bool,
) -> EngineResult<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, type, title, message, read, created_at FROM notifications
         WHERE user_id=?1 AND (?2 = 0 OR read = 0)
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![user_id, unread_only], Notification::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn mark_read(conn: &Connection, id: i64, user_id: &str) -> EngineResult<bool> {
    let n = conn.execute(
        "UPDATE notifications SET read=1 WHERE id=?1 AND user_id=?2",
        params![id, user_id],
    )?;
    Ok(n == 1)
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let user = sub.get_one::<String>("user").unwrap().trim();
    let data = list_notifications(conn, user, sub.get_flag("unread"))?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows = data
            .into_iter()
            .map(|n| {
                vec![
                    n.id.to_string(),
                    n.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    n.r#type,
                    n.title,
                    n.message,
                    if n.read { "yes".into() } else { "".into() },
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["ID", "When", "Type", "Title", "Message", "Read"], rows)
        );
    }
    Ok(())
}
