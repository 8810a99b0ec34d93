mod diskgroup_queries;
mod models;
mod operation_queries;

pub(crate) use models::*;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Thread-safe wrapper around a SQLite connection.
///
/// Holds the cluster's diskgroup configuration and the operation journal.
/// Writes are small and infrequent, so one mutex-guarded connection serves
/// both the API handlers and the running operation.
pub struct Database {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

impl Database {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn =
            Connection::open(path).with_context(|| format!("Failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA temp_store = MEMORY;",
        )?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Run database migrations.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.conn();

        let has_schema_table: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master \
                 WHERE type='table' AND name='schema_version'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for schema_version table")?;

        let current_version = if has_schema_table {
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get::<_, i64>(0)
            })
            .context("Failed to read schema version")?
        } else {
            0
        };

        if current_version < 1 {
            info!("Applying migration 001_initial...");
            let migration = include_str!("../../migrations/001_initial.sql");
            conn.execute_batch(migration).context("Failed to apply migration 001_initial")?;
            info!("Migration 001_initial applied successfully");
        }

        Ok(())
    }

    /// Get a lock on the database connection for executing queries.
    ///
    /// A panic while holding the lock leaves SQLite itself consistent, so a
    /// poisoned mutex is recovered rather than propagated.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark operations left `running` by a crash or kill as `failed`.
    ///
    /// Their remote side effects are unknown; the log says so, and the
    /// operator reruns the operation.
    pub(crate) fn recover_stale_states(&self) -> Result<RecoveryStats> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;

        let mut stmt = tx.prepare("SELECT id FROM operations WHERE status = 'running'")?;
        let interrupted_ids: Vec<i64> =
            stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let operations_failed = tx.execute(
            "UPDATE operations \
             SET status = 'failed', log = 'Interrupted by daemon restart; remote state unknown', \
                 updated_at = datetime('now') \
             WHERE status = 'running'",
            [],
        )?;

        tx.commit()?;

        if operations_failed > 0 {
            warn!("Startup recovery: {} interrupted operation(s) marked failed", operations_failed);
        }

        Ok(RecoveryStats { operations_failed, interrupted_ids })
    }
}

/// Stats returned by startup recovery.
#[derive(Debug)]
pub(crate) struct RecoveryStats {
    pub operations_failed: usize,
    pub interrupted_ids: Vec<i64>,
}
