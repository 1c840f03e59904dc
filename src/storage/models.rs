//! Database models for the book database
//!
//! Row types map one-to-one to tables and derive `FromRow`. Input types
//! (`BookInput`, `NewTerm`, `ReadingEntryInput`) carry caller-supplied data
//! before sanitization.
//!
//! # SQLite Adaptations
//! - Dates stored as TEXT in `YYYY-MM-DD HH:MM:SS` format
//! - Optional foreign keys stored as NULL rather than 0
//! - Taxonomy format stored as its lowercase name

use crate::error::{BookDbError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

/// Storage format of every date column
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// ENUMS
// ============================================================================

/// How terms of a taxonomy are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyFormat {
    /// Free text, comma separated
    Text,
    /// Pick from existing terms
    Checkbox,
}

impl TaxonomyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyFormat::Text => "text",
            TaxonomyFormat::Checkbox => "checkbox",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "checkbox" => TaxonomyFormat::Checkbox,
            _ => TaxonomyFormat::Text,
        }
    }
}

/// Sort direction for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl Order {
    /// `asc` in any case is ascending; anything else descending
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("ASC") {
            Order::Asc
        } else {
            Order::Desc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

// ============================================================================
// MAIN ENTITIES
// ============================================================================

/// Registered taxonomy (`author`, `genre`, ...)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Taxonomy {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub format: String,
}

impl Taxonomy {
    pub fn get_format(&self) -> TaxonomyFormat {
        TaxonomyFormat::parse(&self.format)
    }
}

/// A single term within a taxonomy
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Term {
    pub id: i64,
    pub taxonomy: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub links: String,
    /// Number of books related to this term
    pub count: i64,
    pub date_created: NaiveDateTime,
    pub date_modified: NaiveDateTime,
}

/// Term fields for insert or update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTerm {
    pub taxonomy: String,
    pub name: String,
    /// Derived from `name` when absent
    pub slug: Option<String>,
    pub description: String,
    pub links: String,
}

impl NewTerm {
    pub fn new<T: Into<String>, N: Into<String>>(taxonomy: T, name: N) -> Self {
        Self {
            taxonomy: taxonomy.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn slug<S: Into<String>>(mut self, slug: S) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }
}

/// Book series
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    /// Planned number of books, if known
    #[sqlx(default)]
    pub number_books: Option<i64>,
    pub date_created: NaiveDateTime,
}

/// Book entity
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub id: i64,
    /// Attachment ID of the cover image
    #[sqlx(default)]
    pub cover_id: Option<i64>,
    pub title: String,
    /// Title used for alphabetical indexes (`"Hobbit, The"`)
    pub index_title: String,
    #[sqlx(default)]
    pub series_id: Option<i64>,
    /// Free text so positions like `"2.5"` survive
    #[sqlx(default)]
    pub series_position: Option<String>,
    #[sqlx(default)]
    pub pub_date: Option<NaiveDateTime>,
    #[sqlx(default)]
    pub pages: Option<i64>,
    pub synopsis: String,
    pub goodreads_url: String,
    pub date_created: NaiveDateTime,
    pub date_modified: NaiveDateTime,
}

/// Book data for `save_book`
///
/// `id` set means update. `series_name` without `series_id` finds or creates
/// the series. `terms` maps taxonomy slug to term names and replaces the
/// book's existing terms in each listed taxonomy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookInput {
    pub id: Option<i64>,
    pub cover_id: Option<i64>,
    pub title: String,
    pub index_title: Option<String>,
    pub series_id: Option<i64>,
    pub series_name: Option<String>,
    pub series_position: Option<String>,
    pub pub_date: Option<String>,
    pub pages: Option<i64>,
    pub synopsis: Option<String>,
    pub goodreads_url: Option<String>,
    pub terms: BTreeMap<String, Vec<String>>,
}

impl BookInput {
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn series<S: Into<String>>(mut self, name: S, position: Option<&str>) -> Self {
        self.series_name = Some(name.into());
        self.series_position = position.map(str::to_string);
        self
    }

    pub fn pub_date<S: Into<String>>(mut self, date: S) -> Self {
        self.pub_date = Some(date.into());
        self
    }

    pub fn pages(mut self, pages: i64) -> Self {
        self.pages = Some(pages);
        self
    }

    /// Add term names for a taxonomy
    pub fn terms<I, S>(mut self, taxonomy: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terms
            .entry(taxonomy.to_string())
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }
}

/// One read-through of a book
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct ReadingEntry {
    pub id: i64,
    pub book_id: i64,
    #[sqlx(default)]
    pub review_id: Option<i64>,
    pub user_id: i64,
    #[sqlx(default)]
    pub date_started: Option<NaiveDateTime>,
    #[sqlx(default)]
    pub date_finished: Option<NaiveDateTime>,
    /// 0-100
    pub percentage_complete: i64,
}

impl ReadingEntry {
    pub fn is_finished(&self) -> bool {
        self.date_finished.is_some() && self.percentage_complete >= 100
    }
}

/// Reading entry data for `insert_reading_entry`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadingEntryInput {
    pub id: Option<i64>,
    pub book_id: i64,
    pub review_id: Option<i64>,
    pub user_id: i64,
    pub date_started: Option<String>,
    pub date_finished: Option<String>,
    pub percentage_complete: Option<i64>,
}

// ============================================================================
// DATE HANDLING
// ============================================================================

/// Parse a caller-supplied date
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and
/// RFC 3339. Blank input means no date.
pub fn parse_date_input(field: &str, raw: Option<&str>) -> Result<Option<NaiveDateTime>> {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(None),
    };

    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, DATE_FORMAT) {
        return Ok(Some(dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Some(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.naive_utc()));
    }
    if let Some(dt) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(dt));
    }

    Err(BookDbError::invalid_date(field, raw))
}

/// Format a date the way it is stored
pub fn format_date(date: &NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}
