//! Relational staging store
//!
//! Wraps the embedded SQLite database every run is staged in. The store is
//! ephemeral: `clear_all_tables` empties it at the start of a run and the
//! file is copied into the run's output folder at the end.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::debug;

use crate::error::Result;
use crate::schema::wp;

/// Type alias for the staging database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
/// A scoped pooled connection, released when dropped on any exit path
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Index definitions created after a successful import. Each entry is
/// (index name, target table, indexed column).
const RECOMMENDED_INDEXES: [(&str, &str, &str); 4] = [
    ("idx_order_stats_customer", wp::ORDER_STATS, "customer_id"),
    ("idx_order_stats_date", wp::ORDER_STATS, "date_created"),
    ("idx_usermeta_user", wp::USERMETA, "user_id"),
    ("idx_customer_lookup_user", wp::CUSTOMER_LOOKUP, "user_id"),
];

/// Handle to the embedded staging database
pub struct StagingStore {
    pool: DbPool,
    path: PathBuf,
}

impl StagingStore {
    /// Open (creating if needed) the staging database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().build(manager)?;

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// Get a scoped connection from the pool
    pub fn conn(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Path of the underlying database file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop every user table and view, returning the number dropped.
    ///
    /// After this call the store is empty; internal `sqlite_*` objects are
    /// left alone.
    pub fn clear_all_tables(&self) -> Result<usize> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'",
        )?;
        let objects: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        // Views first so table drops never hit a dependent view.
        let mut dropped = 0;
        for (name, kind) in objects
            .iter()
            .filter(|(_, k)| k == "view")
            .chain(objects.iter().filter(|(_, k)| k == "table"))
        {
            conn.execute_batch(&format!("DROP {} IF EXISTS \"{}\";", kind.to_uppercase(), name))?;
            dropped += 1;
        }

        debug!(dropped, "Cleared staging store");
        Ok(dropped)
    }

    /// Create the recommended indexes where their target tables exist.
    ///
    /// Idempotent: an index already present (by name) is not recreated and
    /// does not count toward the returned total.
    pub fn ensure_recommended_indexes(&self) -> Result<usize> {
        let conn = self.conn()?;
        let mut created = 0;

        for (index_name, table, column) in RECOMMENDED_INDEXES {
            if !Self::relation_exists(&conn, table)? || Self::index_exists(&conn, index_name)? {
                continue;
            }
            conn.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS \"{index_name}\" ON \"{table}\" (\"{column}\");"
            ))?;
            created += 1;
        }

        Ok(created)
    }

    /// Row counts for every user table, by name
    pub fn get_table_row_counts(&self) -> Result<BTreeMap<String, u64>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        let mut counts = BTreeMap::new();
        for table in tables {
            let count: u64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                    row.get(0)
                })?;
            counts.insert(table, count);
        }

        Ok(counts)
    }

    /// Row count of one table or view
    pub fn row_count(&self, relation: &str) -> Result<u64> {
        let conn = self.conn()?;
        let count: u64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM \"{relation}\""), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// True if a table or view with this name exists
    pub fn has_relation(&self, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        Self::relation_exists(&conn, name)
    }

    /// Execute a batch of SQL statements on one scoped connection
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Copy the database file to `dest` for archival in the run's output folder
    pub fn copy_to(&self, dest: &Path) -> Result<()> {
        // Flush any WAL pages so the copied file is self-contained.
        self.conn()?
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        fs::copy(&self.path, dest)?;
        Ok(())
    }

    fn relation_exists(conn: &DbConnection, name: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn index_exists(conn: &DbConnection, name: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}
