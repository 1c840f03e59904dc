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


//! Database storage and models
//!
//! All persistence goes through SQLite via sqlx. Operations are free async
//! functions taking a [`Database`], grouped by entity.
//!
//! # Database Schema
//! - `books`: Core book metadata (title, index title, pub date, pages, ...)
//! - `series`: Book series; books point at one with `series_id`
//! - `book_taxonomies`: Registered taxonomies (author, publisher, genre, source)
//! - `book_terms`: Terms of every taxonomy in one flat table
//! - `book_term_relationships`: Book <-> term junction table
//! - `reading_log`: Reading list entries
//!
//! # Usage Example
//! ```no_run
//! use book_database::storage::{books, models::BookInput, Database};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./books.db").await?;
//!
//! let input = BookInput::new("The Hobbit")
//!     .terms("author", ["J.R.R. Tolkien"])
//!     .terms("genre", ["Fantasy"]);
//! let book_id = books::save_book(&db, &input).await?;
//!
//! let book = books::get_book(&db, book_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod books;
pub mod cache;
pub mod database;
pub mod migrations;
pub mod models;
pub mod reading;
pub mod taxonomies;
pub mod terms;

// Re-export commonly used types
pub use cache::QueryCache;
pub use database::{Database, DatabaseStats};
pub use models::{
    Book, BookInput, NewTerm, Order, ReadingEntry, ReadingEntryInput, Series, Taxonomy,
    TaxonomyFormat, Term,
};
pub use terms::{CountFilter, TermFilter, TermLookup};
