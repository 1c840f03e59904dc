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


//! Positional parameters for hand-built SQL

use serde::Serialize;
use sqlx::query::{QueryAs, QueryScalar};
use sqlx::sqlite::{Sqlite, SqliteArguments};

/// Value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

/// `?,?,?` for `n` values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

pub(crate) fn bind_query_as<'q, O>(
    query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    params: &[SqlParam],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    params.iter().fold(query, |q, param| match param {
        SqlParam::Int(v) => q.bind(*v),
        SqlParam::Text(s) => q.bind(s.clone()),
    })
}

pub(crate) fn bind_query_scalar<'q, O>(
    query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    params: &[SqlParam],
) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
    params.iter().fold(query, |q, param| match param {
        SqlParam::Int(v) => q.bind(*v),
        SqlParam::Text(s) => q.bind(s.clone()),
    })
}
