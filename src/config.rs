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


//! Runtime configuration
//!
//! `BookDbConfig` carries everything the storage layer needs to open a
//! database: where the file lives, how long cached term lookups stay valid,
//! pool sizing, and the table names the tax query engine joins against.
//!
//! # Environment Variables
//! - `BOOKDB_DATABASE_PATH` - SQLite file path
//! - `BOOKDB_CACHE_TTL_SECS` - term cache expiry in seconds
//! - `BOOKDB_MAX_CONNECTIONS` - connection pool size

use crate::error::{BookDbError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default cache expiry for term list/count lookups
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Default connection pool size
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default SQLite busy timeout
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 30;

/// Names of the tables the tax query engine generates SQL against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    /// Flat term table (`id, taxonomy, name, slug, ...`)
    pub terms: String,
    /// Book <-> term junction table (`book_id, term_id`)
    pub relationships: String,
}

impl TableNames {
    pub fn new<T: Into<String>, R: Into<String>>(terms: T, relationships: R) -> Self {
        Self {
            terms: terms.into(),
            relationships: relationships.into(),
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::new("book_terms", "book_term_relationships")
    }
}

/// Configuration for [`crate::storage::Database`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDbConfig {
    /// Database file. `None` opens an in-memory database.
    pub database_path: Option<PathBuf>,

    /// How long cached term queries stay valid
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,

    /// Maximum pooled connections for file-backed databases
    pub max_connections: u32,

    /// How long a writer waits on a locked database
    #[serde(with = "duration_secs")]
    pub busy_timeout: Duration,

    /// Table names used in generated SQL
    pub tables: TableNames,
}

impl Default for BookDbConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS),
            tables: TableNames::default(),
        }
    }
}

impl BookDbConfig {
    pub fn builder() -> BookDbConfigBuilder {
        BookDbConfigBuilder::new()
    }

    /// Build a configuration from `BOOKDB_*` environment variables
    ///
    /// Unset variables keep their defaults. Set-but-malformed values are
    /// rejected rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(path) = lookup("BOOKDB_DATABASE_PATH") {
            if !path.trim().is_empty() {
                builder = builder.database_path(path.trim());
            }
        }

        if let Some(ttl) = lookup("BOOKDB_CACHE_TTL_SECS") {
            let secs: u64 = ttl.trim().parse().map_err(|_| {
                BookDbError::InvalidConfiguration(format!(
                    "BOOKDB_CACHE_TTL_SECS must be a whole number of seconds, got '{}'",
                    ttl
                ))
            })?;
            builder = builder.cache_ttl(Duration::from_secs(secs));
        }

        if let Some(max) = lookup("BOOKDB_MAX_CONNECTIONS") {
            let max: u32 = max.trim().parse().map_err(|_| {
                BookDbError::InvalidConfiguration(format!(
                    "BOOKDB_MAX_CONNECTIONS must be a positive integer, got '{}'",
                    max
                ))
            })?;
            builder = builder.max_connections(max);
        }

        builder.build()
    }
}

/// Builder for BookDbConfig
#[derive(Debug)]
pub struct BookDbConfigBuilder {
    config: BookDbConfig,
}

impl BookDbConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BookDbConfig::default(),
        }
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.database_path = Some(path.into());
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.config.database_path = None;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.config.max_connections = max_connections;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.config.busy_timeout = timeout;
        self
    }

    pub fn tables(mut self, tables: TableNames) -> Self {
        self.config.tables = tables;
        self
    }

    pub fn build(self) -> Result<BookDbConfig> {
        if self.config.max_connections == 0 {
            return Err(BookDbError::InvalidConfiguration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.config.tables.terms.is_empty() || self.config.tables.relationships.is_empty() {
            return Err(BookDbError::InvalidConfiguration(
                "table names must not be empty".to_string(),
            ));
        }
        Ok(self.config)
    }
}

impl Default for BookDbConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
