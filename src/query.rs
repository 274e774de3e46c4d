// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query and export functionality for stored weekly statistics.

use anyhow::{Context, Result};
use camino::Utf8Path;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::{fs::File, io::Write};

pub enum QueryKind {
    Weekly { limit: usize },
    User { handle: String, limit: usize },
    Latest,
}

pub enum ExportKind {
    Csv { output: String },
    Json { output: String },
}

#[derive(Debug, PartialEq, Eq)]
pub struct WeekTotal {
    pub week_start: String,
    /// Users with at least one problem that week.
    pub active_users: u32,
    pub total: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub display_name: String,
    pub handle: String,
    pub problems_solved: u32,
}

/// One stored weekly count, as exported.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct StatRecord {
    pub week_start: String,
    pub display_name: String,
    pub handle: String,
    pub problems_solved: u32,
    pub updated_at: String,
}

pub fn run_query(conn: &Connection, query: QueryKind) -> Result<()> {
    match query {
        QueryKind::Weekly { limit } => print_weekly(conn, limit)?,
        QueryKind::User { handle, limit } => print_user(conn, &handle, limit)?,
        QueryKind::Latest => print_latest(conn)?,
    }
    Ok(())
}

pub fn run_export(conn: &Connection, export: ExportKind) -> Result<()> {
    match export {
        ExportKind::Csv { output } => export_csv(conn, output.as_ref())?,
        ExportKind::Json { output } => export_json(conn, output.as_ref())?,
    }
    Ok(())
}

/// Per-week totals, newest week first.
pub fn weekly_totals(conn: &Connection, limit: usize) -> Result<Vec<WeekTotal>> {
    let mut stmt = conn.prepare(
        "SELECT week_start,
                COUNT(CASE WHEN problems_solved > 0 THEN 1 END),
                SUM(problems_solved)
         FROM weekly_stats
         GROUP BY week_start
         ORDER BY week_start DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], |row| {
        Ok(WeekTotal {
            week_start: row.get(0)?,
            active_users: row.get(1)?,
            total: row.get::<_, i64>(2)? as u64,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// A user's stored weeks, newest first. `None` if the handle isn't
/// registered.
pub fn user_history(
    conn: &Connection,
    handle: &str,
    limit: usize,
) -> Result<Option<Vec<(String, u32)>>> {
    let user_id: Option<i64> = conn
        .query_row("SELECT id FROM users WHERE handle = ?1", [handle], |row| {
            row.get(0)
        })
        .optional()?;
    let Some(user_id) = user_id else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT week_start, problems_solved FROM weekly_stats
         WHERE user_id = ?1
         ORDER BY week_start DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![user_id, limit], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    Ok(Some(rows.collect::<rusqlite::Result<_>>()?))
}

/// The most recent stored week and its ranking. Ties keep registration
/// order.
pub fn latest_leaderboard(conn: &Connection) -> Result<Option<(String, Vec<LeaderboardRow>)>> {
    let week: Option<String> =
        conn.query_row("SELECT MAX(week_start) FROM weekly_stats", [], |row| {
            row.get(0)
        })?;
    let Some(week) = week else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT u.display_name, u.handle, w.problems_solved
         FROM weekly_stats w JOIN users u ON u.id = w.user_id
         WHERE w.week_start = ?1
         ORDER BY w.problems_solved DESC, u.id",
    )?;
    let rows = stmt
        .query_map([&week], |row| {
            Ok(LeaderboardRow {
                display_name: row.get(0)?,
                handle: row.get(1)?,
                problems_solved: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(Some((week, rows)))
}

/// Every stored weekly count, oldest week first.
pub fn stat_records(conn: &Connection) -> Result<Vec<StatRecord>> {
    let mut stmt = conn.prepare(
        "SELECT w.week_start, u.display_name, u.handle, w.problems_solved, w.updated_at
         FROM weekly_stats w JOIN users u ON u.id = w.user_id
         ORDER BY w.week_start, u.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(StatRecord {
            week_start: row.get(0)?,
            display_name: row.get(1)?,
            handle: row.get(2)?,
            problems_solved: row.get(3)?,
            updated_at: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn print_weekly(conn: &Connection, limit: usize) -> Result<()> {
    let totals = weekly_totals(conn, limit)?;

    println!("\n{:<12} {:>8} {:>10}", "Week", "Active", "Solved");
    println!("{}", "=".repeat(32));

    for week in totals {
        println!(
            "{:<12} {:>8} {:>10}",
            week.week_start,
            week.active_users,
            format_number(week.total)
        );
    }

    Ok(())
}

fn print_user(conn: &Connection, handle: &str, limit: usize) -> Result<()> {
    let Some(history) = user_history(conn, handle, limit)? else {
        anyhow::bail!("no registered user with LeetCode username '{}'", handle);
    };

    println!("\nWeekly history for {}", handle);
    println!("\n{:<12} {:>8}", "Week", "Solved");
    println!("{}", "=".repeat(21));
    for (week, solved) in &history {
        println!("{:<12} {:>8}", week, solved);
    }

    let total: u64 = history.iter().map(|(_, solved)| u64::from(*solved)).sum();
    println!("\nTotal over {} weeks: {}", history.len(), format_number(total));
    Ok(())
}

fn print_latest(conn: &Connection) -> Result<()> {
    let Some((week, rows)) = latest_leaderboard(conn)? else {
        println!("\nNo weekly statistics stored yet.");
        return Ok(());
    };

    println!("\nLatest week: {}\n", week);
    for (i, row) in rows.iter().enumerate() {
        println!(
            "{:>3}. {} ({}): {}",
            i + 1,
            row.display_name,
            row.handle,
            row.problems_solved
        );
    }

    let (first_week, last_week): (String, String) = conn.query_row(
        "SELECT MIN(week_start), MAX(week_start) FROM weekly_stats",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    println!("\nData coverage: {} to {}", first_week, last_week);

    Ok(())
}

fn export_csv(conn: &Connection, output: &Utf8Path) -> Result<()> {
    let records = stat_records(conn)?;

    let file = File::create(output.as_std_path())
        .with_context(|| format!("failed to create file at {}", output))?;
    write_csv(file, &records)?;

    println!("Exported {} rows to {}.", records.len(), output);
    Ok(())
}

fn write_csv(out: impl Write, records: &[StatRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn export_json(conn: &Connection, output: &Utf8Path) -> Result<()> {
    let records = stat_records(conn)?;
    let json = serde_json::to_string_pretty(&records)?;

    let mut file = File::create(output.as_std_path())
        .with_context(|| format!("failed to create file at {}", output))?;
    file.write_all(json.as_bytes())?;

    println!("Exported {} rows to {}.", records.len(), output);
    Ok(())
}

/// Format a number with thousands separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, Store};
    use chrono::NaiveDate;

    fn week(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("1", "Alice", "alice").unwrap();
        let bob = db.create_user("2", "Bob, Jr.", "bob").unwrap();
        let carol = db.create_user("3", "Carol", "carol").unwrap();

        db.upsert_weekly_stat(alice.id, week(8, 18), 4).unwrap();
        db.upsert_weekly_stat(bob.id, week(8, 18), 0).unwrap();
        db.upsert_weekly_stat(alice.id, week(8, 25), 3).unwrap();
        db.upsert_weekly_stat(bob.id, week(8, 25), 5).unwrap();
        db.upsert_weekly_stat(carol.id, week(8, 25), 3).unwrap();
        db
    }

    #[test]
    fn test_weekly_totals() {
        let db = seeded();
        let totals = weekly_totals(&db.connection().unwrap(), 12).unwrap();
        assert_eq!(
            totals,
            [
                WeekTotal {
                    week_start: "2025-08-25".to_string(),
                    active_users: 3,
                    total: 11,
                },
                WeekTotal {
                    week_start: "2025-08-18".to_string(),
                    active_users: 1,
                    total: 4,
                },
            ]
        );

        let totals = weekly_totals(&db.connection().unwrap(), 1).unwrap();
        assert_eq!(totals.len(), 1);
    }

    #[test]
    fn test_user_history() {
        let db = seeded();
        let conn = db.connection().unwrap();

        let history = user_history(&conn, "ALICE", 12).unwrap().unwrap();
        assert_eq!(
            history,
            [("2025-08-25".to_string(), 3), ("2025-08-18".to_string(), 4)]
        );
        assert_eq!(user_history(&conn, "carol", 12).unwrap().unwrap().len(), 1);
        assert_eq!(user_history(&conn, "nobody", 12).unwrap(), None);
    }

    #[test]
    fn test_latest_leaderboard() {
        let db = seeded();
        let (week, rows) = latest_leaderboard(&db.connection().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(week, "2025-08-25");
        let ranked: Vec<_> = rows
            .iter()
            .map(|r| (r.handle.as_str(), r.problems_solved))
            .collect();
        assert_eq!(ranked, [("bob", 5), ("alice", 3), ("carol", 3)]);

        let empty = Database::open_in_memory().unwrap();
        assert_eq!(latest_leaderboard(&empty.connection().unwrap()).unwrap(), None);
    }

    #[test]
    fn test_csv_export() {
        let db = seeded();
        let records = stat_records(&db.connection().unwrap()).unwrap();
        assert_eq!(records.len(), 5);

        let mut out = Vec::new();
        write_csv(&mut out, &records).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(
            lines[0],
            "week_start,display_name,handle,problems_solved,updated_at"
        );
        assert!(lines[1].starts_with("2025-08-18,Alice,alice,4,"));
        assert!(lines[2].starts_with("2025-08-18,\"Bob, Jr.\",bob,0,"));
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_json_records() {
        let db = seeded();
        let records = stat_records(&db.connection().unwrap()).unwrap();
        let json = serde_json::to_value(&records).unwrap();
        assert_eq!(json[4]["handle"], "carol");
        assert_eq!(json[4]["problems_solved"], 3);
        assert_eq!(json[4]["week_start"], "2025-08-25");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
