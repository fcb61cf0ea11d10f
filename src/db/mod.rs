//! Database module for Quote Sync
//!
//! SQLite-backed flat key-value storage for the quote collection, the last
//! category filter, sync bookkeeping and scheduler settings. Values are
//! stored as JSON documents.

use crate::quotes::{CategoryFilter, Quote};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

// Connection pooling
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

/// Settings keys
pub const QUOTES_KEY: &str = "quotes";
pub const FILTER_KEY: &str = "lastFilter";
pub const LAST_SYNC_KEY: &str = "lastSync";
pub const SCHEDULER_CONFIG_KEY: &str = "scheduler_config";

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database manager for thread-safe SQLite access
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl Database {
    /// Open (or create) the database file and apply schema and migrations
    pub fn new(db_path: PathBuf) -> DbResult<Self> {
        let manager = SqliteConnectionManager::file(&db_path);

        let pool = Pool::builder()
            .max_size(4)
            .connection_timeout(std::time::Duration::from_secs(10))
            .build(manager)?;

        let conn = pool.get()?;

        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal mode: {}", journal_mode);

        conn.execute_batch(r#"
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#)?;

        Self::init_schema(&conn)?;
        drop(conn);

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create an in-memory database (for testing)
    ///
    /// Every SQLite in-memory connection is its own database, so the pool
    /// holds exactly one connection that is never recycled.
    pub fn in_memory() -> DbResult<Self> {
        let manager = SqliteConnectionManager::memory();

        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        let conn = pool.get()?;
        Self::init_schema(&conn)?;
        drop(conn);

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn init_schema(conn: &Connection) -> DbResult<()> {
        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;
        Self::run_migrations(conn)
    }

    /// Get a connection from the pool
    #[inline]
    pub fn get_conn(&self) -> DbResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    // =========================================================================
    // MIGRATIONS
    // =========================================================================

    /// Run migrations for existing databases
    fn run_migrations(conn: &Connection) -> DbResult<()> {
        // Migration 1: Create sync_history table
        let has_sync_history: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='sync_history'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_sync_history {
            log::info!("Running migration: Creating sync_history table");
            conn.execute_batch(r#"
                CREATE TABLE sync_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    outcome TEXT NOT NULL CHECK (outcome IN ('success', 'conflict', 'failed')),
                    fetched INTEGER NOT NULL DEFAULT 0,
                    appended INTEGER NOT NULL DEFAULT 0,
                    overwritten INTEGER NOT NULL DEFAULT 0,
                    conflicts INTEGER NOT NULL DEFAULT 0,
                    sent INTEGER NOT NULL DEFAULT 0,
                    error_message TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sync_history_created ON sync_history(created_at);
            "#)?;
        }

        Ok(())
    }

    // =========================================================================
    // SETTINGS
    // =========================================================================

    /// Get a setting value
    pub fn get_setting<T: serde::de::DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let conn = self.get_conn()?;
        let result: Result<String, _> = conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            [key],
            |row| row.get(0),
        );

        match result {
            Ok(json) => {
                let value: T = serde_json::from_str(&json)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a setting value
    pub fn set_setting<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> DbResult<()> {
        let conn = self.get_conn()?;
        let json = serde_json::to_string(value)
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, json],
        )?;

        Ok(())
    }

    /// Remove a setting; returns whether it existed
    pub fn remove_setting(&self, key: &str) -> DbResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(affected > 0)
    }

    // =========================================================================
    // QUOTES
    // =========================================================================

    /// Persisted quote array, `None` when nothing was ever saved
    pub fn load_quotes(&self) -> DbResult<Option<Vec<Quote>>> {
        self.get_setting(QUOTES_KEY)
    }

    pub fn save_quotes(&self, quotes: &[Quote]) -> DbResult<()> {
        self.set_setting(QUOTES_KEY, quotes)
    }

    /// Saved filter; stored as `null` for all, otherwise the exact category
    pub fn load_filter(&self) -> DbResult<Option<CategoryFilter>> {
        let raw: Option<Option<String>> = self.get_setting(FILTER_KEY)?;
        Ok(raw.map(|value| match value {
            Some(category) => CategoryFilter::Category(category),
            None => CategoryFilter::All,
        }))
    }

    pub fn save_filter(&self, filter: &CategoryFilter) -> DbResult<()> {
        self.set_setting(FILTER_KEY, &filter.category())
    }

    /// Drop the quote array and the saved filter
    pub fn clear_quotes(&self) -> DbResult<()> {
        self.remove_setting(QUOTES_KEY)?;
        self.remove_setting(FILTER_KEY)?;
        Ok(())
    }

    pub fn last_sync(&self) -> DbResult<Option<DateTime<Utc>>> {
        self.get_setting(LAST_SYNC_KEY)
    }

    pub fn set_last_sync(&self, at: DateTime<Utc>) -> DbResult<()> {
        self.set_setting(LAST_SYNC_KEY, &at)
    }

    // =========================================================================
    // HELPER METHODS (for history module and other internal use)
    // =========================================================================

    /// Execute a SQL statement and return affected rows (for internal use)
    pub fn execute<P>(&self, sql: &str, params: P) -> DbResult<usize>
    where
        P: rusqlite::Params,
    {
        let conn = self.get_conn()?;

        let affected = conn.execute(sql, params)?;
        Ok(affected)
    }

    /// Execute an INSERT statement and return the last inserted row ID
    pub fn execute_insert<P>(&self, sql: &str, params: P) -> DbResult<i64>
    where
        P: rusqlite::Params,
    {
        let conn = self.get_conn()?;

        conn.execute(sql, params)?;
        Ok(conn.last_insert_rowid())
    }

    /// Query database and map results (for internal use)
    pub fn query<T, P, F>(&self, sql: &str, params: P, f: F) -> DbResult<Vec<T>>
    where
        P: rusqlite::Params,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, f)?;

        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(DbError::from)
    }

    /// Query single row (for internal use)
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> DbResult<T>
    where
        P: rusqlite::Params,
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.get_conn()?;

        conn.query_row(sql, params, f).map_err(DbError::from)
    }
}

// ============================================================================
// Tests
// ============================================================================
