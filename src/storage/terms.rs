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


//! Term store
//!
//! Terms live in one flat table keyed by taxonomy slug; books link to them
//! through `book_term_relationships`. Every term's `count` column holds the
//! number of related books and is recomputed whenever relationships change.
//!
//! # Caching
//! `list_terms` and `count_terms` results are cached under
//! [`TERMS_CACHE_GROUP`], keyed by a hash of the full filter. Any write to
//! terms or relationships drops the whole group.

use crate::error::{BookDbError, Result};
use crate::query::params::{bind_query_as, bind_query_scalar, placeholders, SqlParam};
use crate::query::{TaxQuery, TermCatalog};
use crate::storage::cache::QueryCache;
use crate::storage::database::Database;
use crate::storage::models::{NewTerm, Order, Term};
use crate::storage::taxonomies;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashSet};

/// Cache group for term lookups
pub const TERMS_CACHE_GROUP: &str = "book_terms";

/// Columns `list_terms` may order by
pub const TERM_ORDER_COLUMNS: [&str; 8] = [
    "id",
    "taxonomy",
    "name",
    "slug",
    "description",
    "count",
    "date_created",
    "date_modified",
];

/// Default page size for `list_terms`
pub const DEFAULT_TERMS_PER_PAGE: i64 = 20;

lazy_static! {
    static ref SLUG_SEPARATORS: Regex = Regex::new(r"[^a-z0-9]+").expect("valid slug pattern");
}

/// Lowercase, collapse non-alphanumeric runs to `-`, trim dashes
pub fn slugify(value: &str) -> String {
    SLUG_SEPARATORS
        .replace_all(&value.trim().to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

// ============================================================================
// FILTERS
// ============================================================================

/// How to find a single term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermLookup {
    Id(i64),
    Name { taxonomy: String, name: String },
    Slug { taxonomy: String, slug: String },
}

/// Restriction on a term's book count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountFilter {
    Exact(i64),
    GreaterThan(i64),
    LessThan(i64),
}

/// Filter for `list_terms` / `count_terms`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFilter {
    pub ids: Vec<i64>,
    /// Substring of the term name
    pub name: Option<String>,
    pub slug_in: Vec<String>,
    pub name_in: Vec<String>,
    /// Substring of the name or slug
    pub search: Option<String>,
    pub taxonomy: Option<String>,
    pub count: Option<CountFilter>,
    /// Column to order by; unknown columns fall back to `id`
    pub orderby: String,
    pub order: Order,
    /// Page size; zero or less means unlimited
    pub number: i64,
    pub offset: i64,
}

impl Default for TermFilter {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            name: None,
            slug_in: Vec::new(),
            name_in: Vec::new(),
            search: None,
            taxonomy: None,
            count: None,
            orderby: "id".to_string(),
            order: Order::Desc,
            number: DEFAULT_TERMS_PER_PAGE,
            offset: 0,
        }
    }
}

impl TermFilter {
    pub fn ids<I: IntoIterator<Item = i64>>(mut self, ids: I) -> Self {
        self.ids = ids.into_iter().collect();
        self
    }

    pub fn name_like<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn slug_in<I, S>(mut self, slugs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.slug_in = slugs.into_iter().map(Into::into).collect();
        self
    }

    pub fn name_in<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.name_in = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn search<S: Into<String>>(mut self, search: S) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn taxonomy<S: Into<String>>(mut self, taxonomy: S) -> Self {
        self.taxonomy = Some(taxonomy.into());
        self
    }

    pub fn count(mut self, count: CountFilter) -> Self {
        self.count = Some(count);
        self
    }

    pub fn orderby<S: Into<String>>(mut self, column: S) -> Self {
        self.orderby = column.into();
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn number(mut self, number: i64) -> Self {
        self.number = number;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    fn order_column(&self) -> &str {
        let column = self.orderby.trim();
        if TERM_ORDER_COLUMNS.contains(&column) {
            column
        } else {
            "id"
        }
    }

    /// `WHERE` conditions (each starting with ` AND `) and their parameters
    fn where_sql(&self) -> (String, Vec<SqlParam>) {
        let mut sql = String::new();
        let mut params = Vec::new();

        if !self.ids.is_empty() {
            sql.push_str(&format!(" AND id IN ({})", placeholders(self.ids.len())));
            params.extend(self.ids.iter().map(|id| SqlParam::Int(*id)));
        }

        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            sql.push_str(" AND name LIKE ?");
            params.push(SqlParam::Text(format!("%{}%", name)));
        }

        if !self.slug_in.is_empty() {
            sql.push_str(&format!(
                " AND slug COLLATE NOCASE IN ({})",
                placeholders(self.slug_in.len())
            ));
            params.extend(self.slug_in.iter().cloned().map(SqlParam::Text));
        }

        if !self.name_in.is_empty() {
            sql.push_str(&format!(
                " AND name COLLATE NOCASE IN ({})",
                placeholders(self.name_in.len())
            ));
            params.extend(self.name_in.iter().map(|n| SqlParam::Text(n.trim().to_string())));
        }

        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            sql.push_str(" AND (name LIKE ? OR slug LIKE ?)");
            let pattern = format!("%{}%", search);
            params.push(SqlParam::Text(pattern.clone()));
            params.push(SqlParam::Text(pattern));
        }

        if let Some(taxonomy) = &self.taxonomy {
            sql.push_str(" AND taxonomy = ?");
            params.push(SqlParam::Text(taxonomy.clone()));
        }

        match self.count {
            Some(CountFilter::Exact(n)) => {
                sql.push_str(" AND count = ?");
                params.push(SqlParam::Int(n));
            }
            Some(CountFilter::GreaterThan(n)) => {
                sql.push_str(" AND count > ?");
                params.push(SqlParam::Int(n));
            }
            Some(CountFilter::LessThan(n)) => {
                sql.push_str(" AND count < ?");
                params.push(SqlParam::Int(n));
            }
            None => {}
        }

        (sql, params)
    }
}

// ============================================================================
// TERM QUERIES
// ============================================================================

/// Find a single term
pub async fn find_term(db: &Database, lookup: &TermLookup) -> Result<Option<Term>> {
    let query = match lookup {
        TermLookup::Id(id) => {
            sqlx::query_as::<_, Term>("SELECT * FROM book_terms WHERE id = ?").bind(*id)
        }
        TermLookup::Name { taxonomy, name } => sqlx::query_as::<_, Term>(
            "SELECT * FROM book_terms WHERE taxonomy = ? AND name = ? COLLATE NOCASE ORDER BY id LIMIT 1",
        )
        .bind(taxonomy.as_str())
        .bind(name.trim()),
        TermLookup::Slug { taxonomy, slug } => sqlx::query_as::<_, Term>(
            "SELECT * FROM book_terms WHERE taxonomy = ? AND slug = ? COLLATE NOCASE ORDER BY id LIMIT 1",
        )
        .bind(taxonomy.as_str())
        .bind(slug.trim()),
    };

    let term = query.fetch_optional(db.pool()).await?;
    if term.is_none() {
        tracing::debug!(?lookup, "term not found");
    }
    Ok(term)
}

/// List terms matching `filter`
pub async fn list_terms(db: &Database, filter: &TermFilter) -> Result<Vec<Term>> {
    let key = QueryCache::key(TERMS_CACHE_GROUP, &("list", filter))?;
    if let Some(terms) = db.cache().get::<Vec<Term>>(TERMS_CACHE_GROUP, &key).await {
        return Ok(terms);
    }

    let (where_sql, mut params) = filter.where_sql();
    let mut sql = format!(
        "SELECT * FROM book_terms WHERE 1=1{} GROUP BY id ORDER BY {} {}",
        where_sql,
        filter.order_column(),
        filter.order.as_sql()
    );

    if filter.number > 0 {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(SqlParam::Int(filter.number));
        params.push(SqlParam::Int(filter.offset.max(0)));
    } else if filter.offset > 0 {
        sql.push_str(" LIMIT -1 OFFSET ?");
        params.push(SqlParam::Int(filter.offset));
    }

    let terms = bind_query_as(sqlx::query_as::<_, Term>(&sql), &params)
        .fetch_all(db.pool())
        .await?;

    db.cache().set(TERMS_CACHE_GROUP, key, &terms).await?;
    Ok(terms)
}

/// Count terms matching `filter`, ignoring paging and ordering
pub async fn count_terms(db: &Database, filter: &TermFilter) -> Result<i64> {
    let key = QueryCache::key(TERMS_CACHE_GROUP, &("count", filter))?;
    if let Some(count) = db.cache().get::<i64>(TERMS_CACHE_GROUP, &key).await {
        return Ok(count);
    }

    let (where_sql, params) = filter.where_sql();
    let sql = format!("SELECT COUNT(*) FROM book_terms WHERE 1=1{}", where_sql);
    let count: i64 = bind_query_scalar(sqlx::query_scalar(&sql), &params)
        .fetch_one(db.pool())
        .await?;

    db.cache().set(TERMS_CACHE_GROUP, key, &count).await?;
    Ok(count)
}

/// Insert a term, or update it when `id` names an existing term
///
/// Returns the term ID.
pub async fn upsert_term(db: &Database, id: Option<i64>, term: &NewTerm) -> Result<i64> {
    let name = term.name.trim();
    if name.is_empty() {
        return Err(BookDbError::MissingRequiredField("name".to_string()));
    }
    if !taxonomies::taxonomy_exists(db, &term.taxonomy).await? {
        return Err(BookDbError::UnknownTaxonomy(term.taxonomy.clone()));
    }

    let slug = term
        .slug
        .as_deref()
        .map(slugify)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slugify(name));

    let existing = match id {
        Some(id) if id > 0 => find_term(db, &TermLookup::Id(id)).await?,
        _ => None,
    };

    let term_id = match existing {
        Some(existing) => {
            sqlx::query(
                r#"
                UPDATE book_terms SET
                    taxonomy = ?, name = ?, slug = ?, description = ?, links = ?,
                    date_modified = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(&term.taxonomy)
            .bind(name)
            .bind(&slug)
            .bind(&term.description)
            .bind(&term.links)
            .bind(existing.id)
            .execute(db.pool())
            .await?;

            existing.id
        }
        None => {
            let result = sqlx::query(
                "INSERT INTO book_terms (taxonomy, name, slug, description, links) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&term.taxonomy)
            .bind(name)
            .bind(&slug)
            .bind(&term.description)
            .bind(&term.links)
            .execute(db.pool())
            .await?;

            result.last_insert_rowid()
        }
    };

    db.cache().invalidate_group(TERMS_CACHE_GROUP).await;
    Ok(term_id)
}

/// ID of the term called `name` in `taxonomy`, creating it if needed
pub async fn get_or_create_term(db: &Database, taxonomy: &str, name: &str) -> Result<i64> {
    let lookup = TermLookup::Name {
        taxonomy: taxonomy.to_string(),
        name: name.to_string(),
    };

    if let Some(term) = find_term(db, &lookup).await? {
        return Ok(term.id);
    }

    upsert_term(db, None, &NewTerm::new(taxonomy, name)).await
}

/// Delete a term and its relationships
///
/// Returns `false` if the term did not exist.
pub async fn delete_term(db: &Database, id: i64) -> Result<bool> {
    if id <= 0 {
        return Ok(false);
    }

    let removed = sqlx::query("DELETE FROM book_terms WHERE id = ?")
        .bind(id)
        .execute(db.pool())
        .await?
        .rows_affected();

    if removed > 0 {
        db.cache().invalidate_group(TERMS_CACHE_GROUP).await;
    }
    Ok(removed > 0)
}

// ============================================================================
// RELATIONSHIPS
// ============================================================================

/// Relate a book to a term
///
/// Returns `false` if the relationship already existed.
pub async fn add_book_term(db: &Database, book_id: i64, term_id: i64) -> Result<bool> {
    let mut tx = db.pool().begin().await?;
    let added = insert_relationship(&mut tx, book_id, term_id).await?;
    recount_terms(&mut tx, &[term_id]).await?;
    tx.commit().await?;

    db.cache().invalidate_group(TERMS_CACHE_GROUP).await;
    Ok(added)
}

/// Remove a book-term relationship
pub async fn remove_book_term(db: &Database, book_id: i64, term_id: i64) -> Result<bool> {
    let mut tx = db.pool().begin().await?;
    let removed = sqlx::query("DELETE FROM book_term_relationships WHERE book_id = ? AND term_id = ?")
        .bind(book_id)
        .bind(term_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    recount_terms(&mut tx, &[term_id]).await?;
    tx.commit().await?;

    db.cache().invalidate_group(TERMS_CACHE_GROUP).await;
    Ok(removed > 0)
}

/// Terms related to a book, optionally limited to one taxonomy, ordered by name
pub async fn get_book_terms(db: &Database, book_id: i64, taxonomy: Option<&str>) -> Result<Vec<Term>> {
    book_terms(db.pool(), book_id, taxonomy).await
}

async fn book_terms(pool: &SqlitePool, book_id: i64, taxonomy: Option<&str>) -> Result<Vec<Term>> {
    let terms = match taxonomy {
        Some(taxonomy) => {
            sqlx::query_as::<_, Term>(
                r#"
                SELECT t.* FROM book_terms t
                INNER JOIN book_term_relationships r ON r.term_id = t.id
                WHERE r.book_id = ? AND t.taxonomy = ?
                ORDER BY t.name ASC
                "#,
            )
            .bind(book_id)
            .bind(taxonomy)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Term>(
                r#"
                SELECT t.* FROM book_terms t
                INNER JOIN book_term_relationships r ON r.term_id = t.id
                WHERE r.book_id = ?
                ORDER BY t.taxonomy ASC, t.name ASC
                "#,
            )
            .bind(book_id)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(terms)
}

/// All of a book's terms grouped by taxonomy
pub async fn get_all_book_terms(db: &Database, book_id: i64) -> Result<BTreeMap<String, Vec<Term>>> {
    let mut grouped: BTreeMap<String, Vec<Term>> = BTreeMap::new();
    for term in book_terms(db.pool(), book_id, None).await? {
        grouped.entry(term.taxonomy.clone()).or_default().push(term);
    }
    Ok(grouped)
}

/// Set a book's terms in one taxonomy by name
///
/// Missing terms are created. Without `append`, the book's other terms in
/// this taxonomy are removed. Returns the IDs of the named terms.
pub async fn set_book_terms(
    db: &Database,
    book_id: i64,
    names: &[String],
    taxonomy: &str,
    append: bool,
) -> Result<Vec<i64>> {
    let mut tx = db.pool().begin().await?;
    let ids = set_book_terms_in(&mut tx, book_id, names, taxonomy, append).await?;
    tx.commit().await?;

    db.cache().invalidate_group(TERMS_CACHE_GROUP).await;
    Ok(ids)
}

/// `set_book_terms` against an open connection or transaction
///
/// The caller must invalidate [`TERMS_CACHE_GROUP`] after committing.
pub(crate) async fn set_book_terms_in(
    conn: &mut SqliteConnection,
    book_id: i64,
    names: &[String],
    taxonomy: &str,
    append: bool,
) -> Result<Vec<i64>> {
    let registered: Option<i64> = sqlx::query_scalar("SELECT id FROM book_taxonomies WHERE slug = ?")
        .bind(taxonomy)
        .fetch_optional(&mut *conn)
        .await?;
    if registered.is_none() {
        return Err(BookDbError::UnknownTaxonomy(taxonomy.to_string()));
    }

    let mut seen = HashSet::new();
    let mut term_ids = Vec::new();
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if !seen.insert(name.to_lowercase()) {
            continue;
        }

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM book_terms WHERE taxonomy = ? AND name = ? COLLATE NOCASE ORDER BY id LIMIT 1",
        )
        .bind(taxonomy)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        let term_id = match existing {
            Some(id) => id,
            None => sqlx::query("INSERT INTO book_terms (taxonomy, name, slug) VALUES (?, ?, ?)")
                .bind(taxonomy)
                .bind(name)
                .bind(slugify(name))
                .execute(&mut *conn)
                .await?
                .last_insert_rowid(),
        };
        term_ids.push(term_id);
    }

    let mut touched = term_ids.clone();

    if !append {
        let current: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT r.term_id FROM book_term_relationships r
            INNER JOIN book_terms t ON t.id = r.term_id
            WHERE r.book_id = ? AND t.taxonomy = ?
            "#,
        )
        .bind(book_id)
        .bind(taxonomy)
        .fetch_all(&mut *conn)
        .await?;

        for stale in current.into_iter().filter(|id| !term_ids.contains(id)) {
            sqlx::query("DELETE FROM book_term_relationships WHERE book_id = ? AND term_id = ?")
                .bind(book_id)
                .bind(stale)
                .execute(&mut *conn)
                .await?;
            touched.push(stale);
        }
    }

    for term_id in &term_ids {
        insert_relationship(&mut *conn, book_id, *term_id).await?;
    }

    recount_terms(&mut *conn, &touched).await?;
    Ok(term_ids)
}

async fn insert_relationship(conn: &mut SqliteConnection, book_id: i64, term_id: i64) -> Result<bool> {
    let inserted = sqlx::query("INSERT OR IGNORE INTO book_term_relationships (term_id, book_id) VALUES (?, ?)")
        .bind(term_id)
        .bind(book_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(inserted > 0)
}

/// Recompute the `count` column of the given terms
pub(crate) async fn recount_terms(conn: &mut SqliteConnection, term_ids: &[i64]) -> Result<()> {
    if term_ids.is_empty() {
        return Ok(());
    }

    let sql = format!(
        r#"
        UPDATE book_terms
        SET count = (SELECT COUNT(*) FROM book_term_relationships WHERE term_id = book_terms.id)
        WHERE id IN ({})
        "#,
        placeholders(term_ids.len())
    );

    let mut query = sqlx::query(&sql);
    for id in term_ids {
        query = query.bind(*id);
    }
    query.execute(&mut *conn).await?;

    Ok(())
}

// ============================================================================
// TAX QUERY SUPPORT
// ============================================================================

/// Load the taxonomies and terms needed to compile `query`
///
/// Every registered taxonomy is included so unknown ones can be told apart;
/// terms are loaded only for the taxonomies the query names.
pub async fn catalog_for(db: &Database, query: &TaxQuery) -> Result<TermCatalog> {
    let registered: Vec<String> = taxonomies::list_taxonomies(db)
        .await?
        .into_iter()
        .map(|t| t.slug)
        .collect();

    let mut catalog = TermCatalog::new(registered.iter().cloned());

    for taxonomy in query.taxonomies() {
        if !registered.contains(&taxonomy) {
            continue;
        }

        let filter = TermFilter::default()
            .taxonomy(taxonomy)
            .number(0)
            .order(Order::Asc);
        for term in list_terms(db, &filter).await? {
            catalog.insert(&term);
        }
    }

    tracing::debug!(terms = catalog.term_count(), "term catalog loaded");
    Ok(catalog)
}
