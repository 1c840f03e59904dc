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


//! Database migrations
//!
//! Schema creation runs as plain SQL at startup and is tracked in the
//! `_migrations` table, so an existing database only gets the steps it has
//! not seen yet.

use crate::error::Result;
use sqlx::{Executor, SqlitePool};

/// Taxonomies every new database starts with: (name, slug, format)
pub const DEFAULT_TAXONOMIES: [(&str, &str, &str); 4] = [
    ("Author", "author", "text"),
    ("Publisher", "publisher", "text"),
    ("Genre", "genre", "checkbox"),
    ("Source", "source", "checkbox"),
];

/// Run all database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    create_migrations_table(pool).await?;

    run_migration(pool, 1, "initial_schema", create_initial_schema(pool)).await?;
    run_migration(pool, 2, "default_taxonomies", seed_default_taxonomies(pool)).await?;

    Ok(())
}

/// Create migrations tracking table
async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    Ok(())
}

/// Run a single migration if it hasn't been applied yet
async fn run_migration(
    pool: &SqlitePool,
    id: i32,
    name: &str,
    migration_fn: impl std::future::Future<Output = Result<()>>,
) -> Result<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    if applied.is_some() {
        return Ok(());
    }

    migration_fn.await?;

    sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

    tracing::info!(id, name, "applied migration");
    Ok(())
}

/// Create initial database schema
async fn create_initial_schema(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
-- ============================================================================
-- MAIN ENTITIES
-- ============================================================================

CREATE TABLE IF NOT EXISTS series (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    number_books INTEGER,
    date_created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cover_id INTEGER,
    title TEXT NOT NULL,
    index_title TEXT NOT NULL DEFAULT '',
    series_id INTEGER REFERENCES series(id) ON DELETE SET NULL,
    series_position TEXT,
    pub_date TEXT,
    pages INTEGER,
    synopsis TEXT NOT NULL DEFAULT '',
    goodreads_url TEXT NOT NULL DEFAULT '',
    date_created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    date_modified TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- ============================================================================
-- TAXONOMIES AND TERMS
-- ============================================================================

CREATE TABLE IF NOT EXISTS book_taxonomies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    format TEXT NOT NULL DEFAULT 'text'
);

CREATE TABLE IF NOT EXISTS book_terms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    taxonomy TEXT NOT NULL,
    name TEXT NOT NULL,
    slug TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    links TEXT NOT NULL DEFAULT '',
    count INTEGER NOT NULL DEFAULT 0,
    date_created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    date_modified TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS book_term_relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    term_id INTEGER NOT NULL REFERENCES book_terms(id) ON DELETE CASCADE,
    book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    date_created TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (term_id, book_id)
);

-- ============================================================================
-- READING LIST
-- ============================================================================

CREATE TABLE IF NOT EXISTS reading_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    review_id INTEGER,
    user_id INTEGER NOT NULL DEFAULT 0,
    date_started TEXT,
    date_finished TEXT,
    percentage_complete INTEGER NOT NULL DEFAULT 0
);

-- ============================================================================
-- INDEXES for Performance
-- ============================================================================

CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);
CREATE INDEX IF NOT EXISTS idx_books_index_title ON books(index_title);
CREATE INDEX IF NOT EXISTS idx_books_series_id ON books(series_id);
CREATE INDEX IF NOT EXISTS idx_series_name ON series(name);
CREATE INDEX IF NOT EXISTS idx_book_terms_taxonomy ON book_terms(taxonomy);
CREATE INDEX IF NOT EXISTS idx_book_terms_name ON book_terms(taxonomy, name);
CREATE INDEX IF NOT EXISTS idx_book_terms_slug ON book_terms(taxonomy, slug);
CREATE INDEX IF NOT EXISTS idx_relationships_book_id ON book_term_relationships(book_id);
CREATE INDEX IF NOT EXISTS idx_reading_log_book_id ON reading_log(book_id);
        "#,
    )
    .await?;

    Ok(())
}

/// Register the default taxonomies
async fn seed_default_taxonomies(pool: &SqlitePool) -> Result<()> {
    for (name, slug, format) in DEFAULT_TAXONOMIES {
        sqlx::query("INSERT OR IGNORE INTO book_taxonomies (name, slug, format) VALUES (?, ?, ?)")
            .bind(name)
            .bind(slug)
            .bind(format)
            .execute(pool)
            .await?;
    }

    Ok(())
}
