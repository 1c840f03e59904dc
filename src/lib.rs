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


//! Book Database core
//!
//! A personal book library: books, series, taxonomies (author, publisher,
//! genre, source, ...) with their terms, and a reading log.
//!
//! - [`query::tax`] compiles nested taxonomy filters into SQL fragments
//! - [`query::BookQuery`] lists books using those fragments
//! - [`storage`] owns the SQLite database and all CRUD operations

pub mod config;
pub mod error;
pub mod query;
pub mod storage;

pub use config::{BookDbConfig, TableNames};
pub use error::{BookDbError, Result};
pub use query::{BookOrderBy, BookQuery, TaxQuery, TermCatalog};
pub use storage::Database;
