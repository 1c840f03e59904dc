// Book Database - Personal Book Review Library
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Database connection and management
//!
//! This module handles connection pooling, initialization, and maintenance.
//!
//! # SQLite Configuration
//! - WAL mode for better concurrency
//! - Foreign keys enabled (term relationships and reading entries cascade)
//! - Incremental auto-vacuum for space efficiency
//! - Normal synchronous mode (balance safety/speed)

use crate::config::{BookDbConfig, TableNames};
use crate::error::{BookDbError, Result};
use crate::storage::cache::QueryCache;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    ConnectOptions,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Database manager - connection pool, query cache and table names
///
/// Cloning is cheap; clones share the pool and the cache.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: Option<PathBuf>, // None for in-memory databases
    cache: Arc<QueryCache>,
    tables: TableNames,
}

impl Database {
    /// Open (or create) a database file with default settings
    ///
    /// # Errors
    /// Returns error if:
    /// - Parent directory doesn't exist and can't be created
    /// - Database file can't be opened
    /// - Migrations fail
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let config = BookDbConfig::builder()
            .database_path(database_path.as_ref())
            .build()?;
        Self::open(&config).await
    }

    /// Create in-memory database for testing
    pub async fn new_in_memory() -> Result<Self> {
        Self::open(&BookDbConfig::default()).await
    }

    /// Open the database described by `config` and run pending migrations
    pub async fn open(config: &BookDbConfig) -> Result<Self> {
        let pool = match &config.database_path {
            Some(path) => Self::connect_file(path, config).await?,
            None => Self::connect_memory().await?,
        };

        Self::configure_database(&pool).await?;

        let db = Self {
            pool,
            path: config.database_path.clone(),
            cache: Arc::new(QueryCache::new(config.cache_ttl)),
            tables: config.tables.clone(),
        };
        db.migrate().await?;

        tracing::info!(
            path = %db.path.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| ":memory:".to_string()),
            "book database ready"
        );
        Ok(db)
    }

    async fn connect_file(path: &Path, config: &BookDbConfig) -> Result<SqlitePool> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BookDbError::DatabaseError(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let connect_opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_opts)
            .await?;

        Ok(pool)
    }

    async fn connect_memory() -> Result<SqlitePool> {
        let connect_opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .foreign_keys(true)
            .disable_statement_logging();

        // Every connection would get its own empty in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_opts)
            .await?;

        Ok(pool)
    }

    /// Configure database with pragmas
    async fn configure_database(pool: &SqlitePool) -> Result<()> {
        sqlx::query("PRAGMA auto_vacuum = INCREMENTAL")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Run database migrations
    ///
    /// Applies all pending migrations. Called automatically on open.
    pub async fn migrate(&self) -> Result<()> {
        crate::storage::migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| BookDbError::MigrationFailed(e.to_string()))?;

        Ok(())
    }

    /// Get reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database file path
    ///
    /// Returns `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read-through cache for term lookups
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Table names used when compiling tax queries
    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Close database and release all connections
    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    /// Vacuum database to reclaim unused space
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Vacuum only when [`DatabaseStats::should_vacuum`] says so
    ///
    /// Returns whether a vacuum ran.
    pub async fn vacuum_if_needed(&self) -> Result<bool> {
        let stats = self.get_stats().await?;
        if !stats.should_vacuum() {
            return Ok(false);
        }

        tracing::info!(
            unused_percentage = stats.unused_percentage(),
            "vacuuming book database"
        );
        self.vacuum().await?;
        Ok(true)
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;

        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;

        let freelist_count: i64 = sqlx::query_scalar("PRAGMA freelist_count")
            .fetch_one(&self.pool)
            .await?;

        let book_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;

        let term_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book_terms")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            page_count: page_count as u64,
            page_size: page_size as u64,
            freelist_count: freelist_count as u64,
            total_size: (page_count * page_size) as u64,
            unused_size: (freelist_count * page_size) as u64,
            book_count: book_count as u64,
            term_count: term_count as u64,
        })
    }

    /// Checkpoint WAL file to main database
    pub async fn checkpoint(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Copy the database file to `output_path`
    ///
    /// Checkpoints the WAL first so the copy is complete.
    pub async fn export<P: AsRef<Path>>(&self, output_path: P) -> Result<()> {
        let source_path = self
            .path
            .as_ref()
            .ok_or_else(|| BookDbError::InvalidState("Cannot export in-memory database".to_string()))?;

        self.checkpoint().await?;
        tokio::fs::copy(source_path, output_path.as_ref()).await?;

        Ok(())
    }

    /// Runs SQLite integrity check and returns true if database is okay
    pub async fn check_integrity(&self) -> Result<bool> {
        let result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;

        Ok(result == "ok")
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Total number of pages in database
    pub page_count: u64,
    /// Size of each page in bytes
    pub page_size: u64,
    /// Number of free pages (unused space)
    pub freelist_count: u64,
    /// Total size of database (page_count * page_size)
    pub total_size: u64,
    /// Unused space (freelist_count * page_size)
    pub unused_size: u64,
    pub book_count: u64,
    pub term_count: u64,
}

impl DatabaseStats {
    /// Get percentage of unused space
    pub fn unused_percentage(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.unused_size as f64 / self.total_size as f64) * 100.0
        }
    }

    /// Check if vacuum is recommended (>20% unused space)
    pub fn should_vacuum(&self) -> bool {
        self.unused_percentage() > 20.0
    }
}
