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


//! Taxonomy registry
//!
//! A taxonomy must be registered here before terms can be filed under it or
//! a tax query clause can name it.

use crate::error::{BookDbError, Result};
use crate::storage::database::Database;
use crate::storage::models::{Taxonomy, TaxonomyFormat};
use crate::storage::terms::{slugify, TERMS_CACHE_GROUP};

pub async fn list_taxonomies(db: &Database) -> Result<Vec<Taxonomy>> {
    let taxonomies = sqlx::query_as::<_, Taxonomy>("SELECT * FROM book_taxonomies ORDER BY id ASC")
        .fetch_all(db.pool())
        .await?;

    Ok(taxonomies)
}

pub async fn get_taxonomy_by_slug(db: &Database, slug: &str) -> Result<Option<Taxonomy>> {
    let taxonomy = sqlx::query_as::<_, Taxonomy>("SELECT * FROM book_taxonomies WHERE slug = ?")
        .bind(slug)
        .fetch_optional(db.pool())
        .await?;

    Ok(taxonomy)
}

pub async fn taxonomy_exists(db: &Database, slug: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM book_taxonomies WHERE slug = ?")
        .bind(slug)
        .fetch_optional(db.pool())
        .await?;

    Ok(found.is_some())
}

/// Register a taxonomy
///
/// The slug is derived from `name` when not given. Fails with `Duplicate` if
/// the slug is taken.
pub async fn add_taxonomy(
    db: &Database,
    name: &str,
    slug: Option<&str>,
    format: TaxonomyFormat,
) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BookDbError::MissingRequiredField("name".to_string()));
    }

    let slug = slugify(slug.unwrap_or(name));
    if slug.is_empty() {
        return Err(BookDbError::invalid_input(format!(
            "cannot derive a taxonomy slug from '{}'",
            name
        )));
    }

    if taxonomy_exists(db, &slug).await? {
        return Err(BookDbError::Duplicate {
            entity_type: "taxonomy".to_string(),
            key: slug,
        });
    }

    let result = sqlx::query("INSERT INTO book_taxonomies (name, slug, format) VALUES (?, ?, ?)")
        .bind(name)
        .bind(&slug)
        .bind(format.as_str())
        .execute(db.pool())
        .await?;

    tracing::debug!(slug = %slug, "taxonomy registered");
    Ok(result.last_insert_rowid())
}

/// Remove a taxonomy together with all of its terms
///
/// Returns `false` if no taxonomy has this slug.
pub async fn delete_taxonomy(db: &Database, slug: &str) -> Result<bool> {
    let mut tx = db.pool().begin().await?;

    let removed = sqlx::query("DELETE FROM book_taxonomies WHERE slug = ?")
        .bind(slug)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if removed > 0 {
        sqlx::query("DELETE FROM book_terms WHERE taxonomy = ?")
            .bind(slug)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    if removed > 0 {
        db.cache().invalidate_group(TERMS_CACHE_GROUP).await;
    }
    Ok(removed > 0)
}
