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


//! Book listing query
//!
//! Column filters are bound as parameters. Tax query fragments are pasted
//! into the statement as generated; they only ever contain integers, table
//! names and quoted taxonomy slugs.
//!
//! ```no_run
//! use book_database::query::BookQuery;
//! use book_database::storage::{Database, Order};
//! use serde_json::json;
//!
//! # async fn example(db: &Database) -> book_database::Result<()> {
//! let books = BookQuery::new()
//!     .tax_query(json!({
//!         "relation": "OR",
//!         "0": {"taxonomy": "genre", "terms": ["fantasy"], "field": "slug"},
//!         "1": {"taxonomy": "genre", "terms": ["horror"], "field": "slug"}
//!     }))
//!     .order(Order::Asc)
//!     .fetch(db)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use super::params::{bind_query_as, bind_query_scalar, placeholders, SqlParam};
use super::tax::{TaxClause, TaxQuery, TermField, TermResolver};
use crate::config::TableNames;
use crate::error::Result;
use crate::storage::database::Database;
use crate::storage::models::{Book, Order};
use crate::storage::terms;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default page size
pub const DEFAULT_BOOKS_PER_PAGE: i64 = 20;

/// Column a book listing is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookOrderBy {
    #[default]
    Id,
    Title,
    IndexTitle,
    PubDate,
    Pages,
    DateCreated,
    SeriesPosition,
}

impl BookOrderBy {
    /// Unknown column names sort by ID
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "title" => BookOrderBy::Title,
            "index_title" => BookOrderBy::IndexTitle,
            "pub_date" => BookOrderBy::PubDate,
            "pages" => BookOrderBy::Pages,
            "date_created" => BookOrderBy::DateCreated,
            "series_position" => BookOrderBy::SeriesPosition,
            _ => BookOrderBy::Id,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            BookOrderBy::Id => "book.id",
            BookOrderBy::Title => "book.title",
            BookOrderBy::IndexTitle => "book.index_title",
            BookOrderBy::PubDate => "book.pub_date",
            BookOrderBy::Pages => "book.pages",
            BookOrderBy::DateCreated => "book.date_created",
            BookOrderBy::SeriesPosition => "book.series_position",
        }
    }
}

/// Filtered, ordered, paged book listing
#[derive(Debug, Clone)]
pub struct BookQuery {
    ids: Vec<i64>,
    title: Option<String>,
    author_name: Option<String>,
    series_id: Option<i64>,
    series_name: Option<String>,
    tax_query: Option<Value>,
    orderby: BookOrderBy,
    order: Order,
    number: i64,
    offset: i64,
}

impl Default for BookQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl BookQuery {
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            title: None,
            author_name: None,
            series_id: None,
            series_name: None,
            tax_query: None,
            orderby: BookOrderBy::Id,
            order: Order::Desc,
            number: DEFAULT_BOOKS_PER_PAGE,
            offset: 0,
        }
    }

    pub fn ids<I: IntoIterator<Item = i64>>(mut self, ids: I) -> Self {
        self.ids = ids.into_iter().collect();
        self
    }

    /// Title substring
    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Author name or slug substring
    pub fn author_name<S: Into<String>>(mut self, name: S) -> Self {
        self.author_name = Some(name.into());
        self
    }

    pub fn series_id(mut self, series_id: i64) -> Self {
        self.series_id = Some(series_id);
        self
    }

    /// Series name substring
    pub fn series_name<S: Into<String>>(mut self, name: S) -> Self {
        self.series_name = Some(name.into());
        self
    }

    /// Raw tax query, see [`TaxQuery::from_value`]
    pub fn tax_query(mut self, raw: Value) -> Self {
        self.tax_query = Some(raw);
        self
    }

    pub fn orderby(mut self, orderby: BookOrderBy) -> Self {
        self.orderby = orderby;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Page size; zero or less means unlimited
    pub fn number(mut self, number: i64) -> Self {
        self.number = number;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// The caller's tax query, with the author filter ANDed on
    pub fn build_tax_query(&self, tables: &TableNames) -> TaxQuery {
        let tax = self
            .tax_query
            .as_ref()
            .map(TaxQuery::from_value)
            .unwrap_or_default()
            .with_tables(tables.clone());

        match self.author_name.as_deref().map(str::trim) {
            Some(author) if !author.is_empty() => tax.and(
                TaxClause::new("author")
                    .terms([author])
                    .field(TermField::Search),
            ),
            _ => tax,
        }
    }

    /// `FROM ... WHERE ...` shared by the select and count statements
    fn from_where(&self, tax: &TaxQuery, resolver: &dyn TermResolver) -> (String, Vec<SqlParam>) {
        let tax_sql = tax.get_sql("book", "id", resolver);
        let mut sql = String::from("FROM books AS book");
        let mut params = Vec::new();

        let series_name = self.series_name.as_deref().filter(|s| !s.trim().is_empty());
        if series_name.is_some() {
            sql.push_str(" LEFT JOIN series AS series ON book.series_id = series.id");
        }
        sql.push_str(&tax_sql.join);
        sql.push_str(" WHERE 1=1");

        if !self.ids.is_empty() {
            sql.push_str(&format!(" AND book.id IN ({})", placeholders(self.ids.len())));
            params.extend(self.ids.iter().map(|id| SqlParam::Int(*id)));
        }

        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            sql.push_str(" AND book.title LIKE ?");
            params.push(SqlParam::Text(format!("%{}%", title.trim())));
        }

        if let Some(series_id) = self.series_id {
            sql.push_str(" AND book.series_id = ?");
            params.push(SqlParam::Int(series_id));
        }

        if let Some(name) = series_name {
            sql.push_str(" AND series.name LIKE ?");
            params.push(SqlParam::Text(format!("%{}%", name.trim())));
        }

        sql.push_str(&tax_sql.where_clause);
        (sql, params)
    }

    /// Full `SELECT` statement and its parameters
    pub fn to_sql(&self, tables: &TableNames, resolver: &dyn TermResolver) -> (String, Vec<SqlParam>) {
        let tax = self.build_tax_query(tables);
        self.select_sql(&tax, resolver)
    }

    fn select_sql(&self, tax: &TaxQuery, resolver: &dyn TermResolver) -> (String, Vec<SqlParam>) {
        let (from_where, mut params) = self.from_where(tax, resolver);
        let mut sql = format!(
            "SELECT book.* {} GROUP BY book.id ORDER BY {} {}",
            from_where,
            self.orderby.column(),
            self.order.as_sql()
        );

        if self.number > 0 {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(SqlParam::Int(self.number));
            params.push(SqlParam::Int(self.offset.max(0)));
        } else if self.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(SqlParam::Int(self.offset));
        }

        (sql, params)
    }

    fn count_sql(&self, tax: &TaxQuery, resolver: &dyn TermResolver) -> (String, Vec<SqlParam>) {
        let (from_where, params) = self.from_where(tax, resolver);
        (format!("SELECT COUNT(DISTINCT book.id) {}", from_where), params)
    }

    /// Run the query
    pub async fn fetch(&self, db: &Database) -> Result<Vec<Book>> {
        let tax = self.build_tax_query(db.tables());
        let catalog = terms::catalog_for(db, &tax).await?;
        let (sql, params) = self.select_sql(&tax, &catalog);

        tracing::debug!(sql = %sql, "fetching books");
        let books = bind_query_as(sqlx::query_as::<_, Book>(&sql), &params)
            .fetch_all(db.pool())
            .await?;

        Ok(books)
    }

    /// Number of matching books, ignoring paging
    pub async fn count(&self, db: &Database) -> Result<i64> {
        let tax = self.build_tax_query(db.tables());
        let catalog = terms::catalog_for(db, &tax).await?;
        let (sql, params) = self.count_sql(&tax, &catalog);

        let count: i64 = bind_query_scalar(sqlx::query_scalar(&sql), &params)
            .fetch_one(db.pool())
            .await?;

        Ok(count)
    }
}
