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


//! Query building
//!
//! - `tax` - taxonomy filter tree to JOIN/WHERE compilation
//! - `catalog` - in-memory term resolver used during compilation
//! - `books` - book listing query with tax filters, ordering and paging
//! - `params` - positional parameters for hand-built SQL

pub mod books;
pub mod catalog;
pub mod params;
pub mod tax;

pub use books::{BookOrderBy, BookQuery};
pub use catalog::TermCatalog;
pub use params::SqlParam;
pub use tax::{
    FilterGroup, FilterNode, QueriedTerms, Relation, SqlClauses, TaxClause, TaxOperator, TaxQuery,
    TermField, TermResolver, TermValue, NO_RESULTS_WHERE,
};
