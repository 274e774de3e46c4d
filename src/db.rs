// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database operations for registered users and weekly statistics.

use crate::error::StoreError;
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::sync::{Mutex, MutexGuard};

/// A member who signed up for weekly updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisteredUser {
    /// Row id; ascending ids follow registration order.
    pub id: i64,
    /// The member's chat platform id.
    pub external_id: String,
    pub display_name: String,
    /// LeetCode username.
    pub handle: String,
    pub registered_at: String,
    pub last_updated: String,
}

/// Storage for registered users and their weekly counts.
pub trait Store: Send + Sync {
    fn get_user(&self, external_id: &str) -> Result<Option<RegisteredUser>, StoreError>;

    fn get_user_by_handle(&self, handle: &str) -> Result<Option<RegisteredUser>, StoreError>;

    /// All users in registration order.
    fn list_users(&self) -> Result<Vec<RegisteredUser>, StoreError>;

    /// Fails if the external id or the handle is already present.
    fn create_user(
        &self,
        external_id: &str,
        display_name: &str,
        handle: &str,
    ) -> Result<RegisteredUser, StoreError>;

    /// Returns whether a user was deleted.
    fn delete_user(&self, external_id: &str) -> Result<bool, StoreError>;

    /// Insert or overwrite the count for `(user_id, week_start)`.
    fn upsert_weekly_stat(
        &self,
        user_id: i64,
        week_start: NaiveDate,
        problems_solved: u32,
    ) -> Result<(), StoreError>;

    fn weekly_stat(&self, user_id: i64, week_start: NaiveDate) -> Result<Option<u32>, StoreError>;

    fn touch_user(&self, user_id: i64) -> Result<(), StoreError>;

    /// Take the weekly run lock for `holder` (`now` in unix seconds). Fails
    /// to take it while another holder's lock is younger than
    /// `stale_after_secs`. Returns whether the lock was taken.
    fn try_acquire_run_lock(
        &self,
        holder: &str,
        now: i64,
        stale_after_secs: i64,
    ) -> Result<bool, StoreError>;

    /// Release the run lock if `holder` still has it.
    fn release_run_lock(&self, holder: &str) -> Result<(), StoreError>;
}

/// SQLite-backed [`Store`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Utf8Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent.as_std_path())
                .with_context(|| format!("failed to create directory {}", parent))?;
        }
        let conn = Connection::open(path.as_std_path())
            .with_context(|| format!("failed to open database at {}", path))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // journal_mode and synchronous persist in the file; the rest are
        // per-connection.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                handle TEXT NOT NULL UNIQUE COLLATE NOCASE,
                registered_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            -- One row per user and reporting week
            CREATE TABLE IF NOT EXISTS weekly_stats (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                week_start TEXT NOT NULL,        -- Monday of week (YYYY-MM-DD)
                problems_solved INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, week_start)
            ) WITHOUT ROWID;

            CREATE INDEX IF NOT EXISTS idx_weekly_week ON weekly_stats(week_start);

            -- Weekly run in progress, shared by every process using this file
            CREATE TABLE IF NOT EXISTS run_lock (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                holder TEXT NOT NULL,
                acquired_at INTEGER NOT NULL     -- unix seconds
            );
            "#,
        )
        .context("failed to initialize database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the underlying connection, for ad-hoc queries.
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

const USER_COLUMNS: &str =
    "id, external_id, display_name, handle, registered_at, last_updated";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<RegisteredUser> {
    Ok(RegisteredUser {
        id: row.get(0)?,
        external_id: row.get(1)?,
        display_name: row.get(2)?,
        handle: row.get(3)?,
        registered_at: row.get(4)?,
        last_updated: row.get(5)?,
    })
}

fn find_user(
    conn: &Connection,
    column: &str,
    value: &dyn rusqlite::ToSql,
) -> Result<Option<RegisteredUser>, StoreError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    Ok(conn
        .query_row(&sql, [value], user_from_row)
        .optional()?)
}

impl Store for Database {
    fn get_user(&self, external_id: &str) -> Result<Option<RegisteredUser>, StoreError> {
        find_user(&*self.connection()?, "external_id", &external_id)
    }

    fn get_user_by_handle(&self, handle: &str) -> Result<Option<RegisteredUser>, StoreError> {
        find_user(&*self.connection()?, "handle", &handle)
    }

    fn list_users(&self) -> Result<Vec<RegisteredUser>, StoreError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn create_user(
        &self,
        external_id: &str,
        display_name: &str,
        handle: &str,
    ) -> Result<RegisteredUser, StoreError> {
        let conn = self.connection()?;

        // The connection lock makes check-then-insert atomic for this
        // process; the UNIQUE constraints cover everyone else.
        if find_user(&conn, "external_id", &external_id)?.is_some() {
            return Err(StoreError::DuplicateExternalId(external_id.to_string()));
        }
        if find_user(&conn, "handle", &handle)?.is_some() {
            return Err(StoreError::DuplicateHandle(handle.to_string()));
        }

        conn.execute(
            "INSERT INTO users (external_id, display_name, handle) VALUES (?1, ?2, ?3)",
            params![external_id, display_name, handle],
        )
        .map_err(|err| match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => {
                StoreError::DuplicateHandle(handle.to_string())
            }
            _ => StoreError::Sqlite(err),
        })?;

        let id = conn.last_insert_rowid();
        find_user(&conn, "id", &id)?
            .ok_or_else(|| StoreError::Corrupt(format!("user {} vanished after insert", id)))
    }

    fn delete_user(&self, external_id: &str) -> Result<bool, StoreError> {
        let deleted = self
            .connection()?
            .execute("DELETE FROM users WHERE external_id = ?1", [external_id])?;
        Ok(deleted > 0)
    }

    fn upsert_weekly_stat(
        &self,
        user_id: i64,
        week_start: NaiveDate,
        problems_solved: u32,
    ) -> Result<(), StoreError> {
        self.connection()?.execute(
            "INSERT INTO weekly_stats (user_id, week_start, problems_solved)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, week_start) DO UPDATE SET
                problems_solved = excluded.problems_solved,
                updated_at = CURRENT_TIMESTAMP",
            params![user_id, week_start.to_string(), problems_solved],
        )?;
        Ok(())
    }

    fn weekly_stat(&self, user_id: i64, week_start: NaiveDate) -> Result<Option<u32>, StoreError> {
        let count = self
            .connection()?
            .query_row(
                "SELECT problems_solved FROM weekly_stats WHERE user_id = ?1 AND week_start = ?2",
                params![user_id, week_start.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }

    fn touch_user(&self, user_id: i64) -> Result<(), StoreError> {
        self.connection()?.execute(
            "UPDATE users SET last_updated = CURRENT_TIMESTAMP WHERE id = ?1",
            [user_id],
        )?;
        Ok(())
    }

    fn try_acquire_run_lock(
        &self,
        holder: &str,
        now: i64,
        stale_after_secs: i64,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection()?;
        // IMMEDIATE takes the write lock up front, so two processes can't
        // both see the lock as free.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let acquired_at: Option<i64> = tx
            .query_row("SELECT acquired_at FROM run_lock WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        if acquired_at.is_some_and(|at| at > now - stale_after_secs) {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO run_lock (id, holder, acquired_at) VALUES (1, ?1, ?2)
             ON CONFLICT (id) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at",
            params![holder, now],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn release_run_lock(&self, holder: &str) -> Result<(), StoreError> {
        self.connection()?.execute(
            "DELETE FROM run_lock WHERE id = 1 AND holder = ?1",
            [holder],
        )?;
        Ok(())
    }
}
