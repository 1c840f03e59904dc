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


//! Book and series operations

use crate::error::{BookDbError, Result};
use crate::storage::database::Database;
use crate::storage::models::{format_date, parse_date_input, Book, BookInput, Series};
use crate::storage::terms::{self, slugify, TERMS_CACHE_GROUP};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

// ============================================================================
// BOOK QUERIES
// ============================================================================

/// Insert a book, or update it when `input.id` is set
///
/// Series, book row and term relationships are written in one transaction.
/// Returns the book ID.
pub async fn save_book(db: &Database, input: &BookInput) -> Result<i64> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(BookDbError::MissingRequiredField("title".to_string()));
    }

    let pub_date = parse_date_input("pub_date", input.pub_date.as_deref())?.map(|d| format_date(&d));

    let index_title = input
        .index_title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| generate_alternative_title(title))
        .unwrap_or_else(|| title.to_string());

    let series_position = input
        .series_position
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let cover_id = input.cover_id.filter(|id| *id > 0);
    let pages = input.pages.filter(|p| *p > 0);
    let synopsis = input.synopsis.as_deref().map(str::trim).unwrap_or_default();
    let goodreads_url = input.goodreads_url.as_deref().map(str::trim).unwrap_or_default();

    let mut tx = db.pool().begin().await?;

    let series_id = match (input.series_id.filter(|id| *id > 0), input.series_name.as_deref()) {
        (Some(id), _) => Some(id),
        (None, Some(name)) if !name.trim().is_empty() => Some(find_or_insert_series(&mut tx, name, "").await?),
        _ => None,
    };

    let book_id = match input.id.filter(|id| *id > 0) {
        Some(id) => {
            let updated = sqlx::query(
                r#"
                UPDATE books SET
                    cover_id = ?, title = ?, index_title = ?, series_id = ?, series_position = ?,
                    pub_date = ?, pages = ?, synopsis = ?, goodreads_url = ?,
                    date_modified = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(cover_id)
            .bind(title)
            .bind(&index_title)
            .bind(series_id)
            .bind(series_position)
            .bind(&pub_date)
            .bind(pages)
            .bind(synopsis)
            .bind(goodreads_url)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated == 0 {
                return Err(BookDbError::not_found(format!("Book {}", id)));
            }
            id
        }
        None => sqlx::query(
            r#"
            INSERT INTO books (
                cover_id, title, index_title, series_id, series_position,
                pub_date, pages, synopsis, goodreads_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(cover_id)
        .bind(title)
        .bind(&index_title)
        .bind(series_id)
        .bind(series_position)
        .bind(&pub_date)
        .bind(pages)
        .bind(synopsis)
        .bind(goodreads_url)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid(),
    };

    for (taxonomy, names) in &input.terms {
        terms::set_book_terms_in(&mut tx, book_id, names, taxonomy, false).await?;
    }

    tx.commit().await?;

    if !input.terms.is_empty() {
        db.cache().invalidate_group(TERMS_CACHE_GROUP).await;
    }

    tracing::info!(book_id, title, "book saved");
    Ok(book_id)
}

pub async fn get_book(db: &Database, book_id: i64) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
        .bind(book_id)
        .fetch_optional(db.pool())
        .await?;

    Ok(book)
}

pub async fn book_exists(db: &Database, book_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM books WHERE id = ?")
        .bind(book_id)
        .fetch_optional(db.pool())
        .await?;

    Ok(found.is_some())
}

/// Delete a book with its term relationships and reading entries
///
/// Returns `false` if the book did not exist.
pub async fn delete_book(db: &Database, book_id: i64) -> Result<bool> {
    let mut tx = db.pool().begin().await?;

    let term_ids: Vec<i64> = sqlx::query_scalar("SELECT term_id FROM book_term_relationships WHERE book_id = ?")
        .bind(book_id)
        .fetch_all(&mut *tx)
        .await?;

    let removed = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(book_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    terms::recount_terms(&mut tx, &term_ids).await?;
    tx.commit().await?;

    if removed > 0 && !term_ids.is_empty() {
        db.cache().invalidate_group(TERMS_CACHE_GROUP).await;
    }
    Ok(removed > 0)
}

/// Comma-separated author names of a book, empty if it has none
pub async fn get_book_author_names(db: &Database, book_id: i64) -> Result<String> {
    let authors = terms::get_book_terms(db, book_id, Some("author")).await?;
    Ok(authors
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", "))
}

/// Alternative sort title: `"The Hobbit"` becomes `"Hobbit, The"`
///
/// Returns `None` when the title has no leading article.
pub fn generate_alternative_title(title: &str) -> Option<String> {
    ["The", "An", "A"].iter().find_map(|article| {
        title
            .strip_prefix(article)
            .and_then(|rest| rest.strip_prefix(' '))
            .filter(|rest| !rest.trim().is_empty())
            .map(|rest| format!("{}, {}", rest.trim(), article))
    })
}

// ============================================================================
// SERIES QUERIES
// ============================================================================

/// Series a book belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSeriesName {
    pub name: String,
    pub series_position: Option<String>,
}

/// Insert a series unless one with this name exists
///
/// Returns the series ID either way.
pub async fn insert_series(db: &Database, name: &str, description: &str) -> Result<i64> {
    if name.trim().is_empty() {
        return Err(BookDbError::MissingRequiredField("name".to_string()));
    }

    let mut conn = db.pool().acquire().await?;
    find_or_insert_series(&mut conn, name, description).await
}

async fn find_or_insert_series(conn: &mut SqliteConnection, name: &str, description: &str) -> Result<i64> {
    let name = name.trim();

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM series WHERE name = ? COLLATE NOCASE ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let result = sqlx::query("INSERT INTO series (name, slug, description) VALUES (?, ?, ?)")
        .bind(name)
        .bind(slugify(name))
        .bind(description.trim())
        .execute(&mut *conn)
        .await?;

    tracing::debug!(series = name, "series created");
    Ok(result.last_insert_rowid())
}

pub async fn get_series_by_name(db: &Database, name: &str) -> Result<Option<Series>> {
    let series = sqlx::query_as::<_, Series>(
        "SELECT * FROM series WHERE name = ? COLLATE NOCASE ORDER BY id LIMIT 1",
    )
    .bind(name.trim())
    .fetch_optional(db.pool())
    .await?;

    Ok(series)
}

/// Name of the book's series, with its position when `with_position` is set
pub async fn get_book_series_name(
    db: &Database,
    book_id: i64,
    with_position: bool,
) -> Result<Option<BookSeriesName>> {
    let row: Option<(String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT series.name, book.series_position
        FROM series AS series
        INNER JOIN books AS book ON series.id = book.series_id
        WHERE book.id = ?
        "#,
    )
    .bind(book_id)
    .fetch_optional(db.pool())
    .await?;

    Ok(row.map(|(name, position)| BookSeriesName {
        name,
        series_position: if with_position { position } else { None },
    }))
}

/// `"Series Name #2"`, or just the name when the position is unknown
pub async fn get_formatted_series_name(db: &Database, book_id: i64) -> Result<Option<String>> {
    let series = get_book_series_name(db, book_id, true).await?;

    Ok(series.map(|s| match s.series_position {
        Some(position) if !position.is_empty() => format!("{} #{}", s.name, position),
        _ => s.name,
    }))
}
