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


//! Taxonomy query engine
//!
//! Compiles a nested boolean filter over book terms into `JOIN` and `WHERE`
//! fragments that can be appended to any `SELECT ... WHERE 1=1` built against
//! a primary table. The caller never needs to know the term/relationship schema.
//!
//! # Input Shape
//! A tax query is a loosely-typed JSON structure:
//! ```json
//! {
//!     "relation": "OR",
//!     "0": { "taxonomy": "genre", "terms": [5, 7] },
//!     "1": { "taxonomy": "author", "terms": ["jane-doe"], "field": "slug" },
//!     "2": { "relation": "AND", "clauses": [ ... ] }
//! }
//! ```
//! Any object containing `terms`, `taxonomy`, `field` or `operator` (or an
//! empty object) is a clause. Any other object is a nested group. Lists are
//! spliced into the group that contains them. Everything else is dropped.
//!
//! # Failure Policy
//! Compilation never fails. An unknown taxonomy turns its clause into the
//! no-results sentinel (`0 = 1`); an empty term list either matches nothing
//! (`IN`) or applies no restriction (`NOT IN`, `AND`).

use crate::config::TableNames;
use crate::error::Result;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// WHERE fragment that matches no rows
pub const NO_RESULTS_WHERE: &str = "0 = 1";

/// Column in the relationships table that references the term
const TERM_ID_COLUMN: &str = "term_id";

/// Column in the relationships table that references the book
const OBJECT_ID_COLUMN: &str = "book_id";

// ============================================================================
// FILTER TREE
// ============================================================================

/// How the children of a group are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Relation {
    #[default]
    And,
    Or,
}

impl Relation {
    /// Anything other than a case-insensitive `OR` is `AND`
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("OR") {
            Relation::Or
        } else {
            Relation::And
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Relation::And => "AND",
            Relation::Or => "OR",
        }
    }
}

/// Term field a clause's `terms` are expressed in
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TermField {
    #[default]
    Id,
    Slug,
    Name,
    /// Free-text match against term name or slug
    Search,
    /// Unrecognized field name. Terms are treated as IDs that must exist in the taxonomy.
    Other(String),
}

impl TermField {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "id" | "term_id" => TermField::Id,
            "slug" => TermField::Slug,
            "name" => TermField::Name,
            "search" => TermField::Search,
            _ => TermField::Other(raw.to_string()),
        }
    }

    pub fn is_id(&self) -> bool {
        matches!(self, TermField::Id)
    }

    fn is_blank(&self) -> bool {
        matches!(self, TermField::Other(raw) if raw.trim().is_empty())
    }
}

impl fmt::Display for TermField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermField::Id => write!(f, "id"),
            TermField::Slug => write!(f, "slug"),
            TermField::Name => write!(f, "name"),
            TermField::Search => write!(f, "search"),
            TermField::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// Clause operator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaxOperator {
    /// Book has at least one of the terms
    #[default]
    In,
    /// Book has none of the terms
    NotIn,
    /// Book has every one of the terms
    And,
    /// Book has any term in the taxonomy
    Exists,
    /// Book has no term in the taxonomy
    NotExists,
    /// Unrecognized operator. Compiles to no restriction.
    Other(String),
}

impl TaxOperator {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        match normalized.as_str() {
            "IN" => TaxOperator::In,
            "NOT IN" => TaxOperator::NotIn,
            "AND" => TaxOperator::And,
            "EXISTS" => TaxOperator::Exists,
            "NOT EXISTS" => TaxOperator::NotExists,
            _ => TaxOperator::Other(raw.to_string()),
        }
    }
}

impl fmt::Display for TaxOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxOperator::In => write!(f, "IN"),
            TaxOperator::NotIn => write!(f, "NOT IN"),
            TaxOperator::And => write!(f, "AND"),
            TaxOperator::Exists => write!(f, "EXISTS"),
            TaxOperator::NotExists => write!(f, "NOT EXISTS"),
            TaxOperator::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// A single term identifier as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermValue {
    Id(i64),
    Text(String),
}

impl TermValue {
    /// Convert a scalar JSON value. Containers and nulls are not term values.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(TermValue::Id)
                .or_else(|| Some(TermValue::Text(n.to_string()))),
            Value::String(s) => Some(TermValue::Text(s.clone())),
            Value::Bool(b) => Some(TermValue::Id(i64::from(*b))),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Interpret as a term ID
    pub fn as_id(&self) -> Option<i64> {
        match self {
            TermValue::Id(id) => Some(*id),
            TermValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Zero, empty string and `"0"` carry no term
    pub fn is_falsy(&self) -> bool {
        match self {
            TermValue::Id(id) => *id == 0,
            TermValue::Text(s) => s.is_empty() || s == "0",
        }
    }
}

impl fmt::Display for TermValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermValue::Id(id) => write!(f, "{}", id),
            TermValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for TermValue {
    fn from(id: i64) -> Self {
        TermValue::Id(id)
    }
}

impl From<&str> for TermValue {
    fn from(s: &str) -> Self {
        TermValue::Text(s.to_string())
    }
}

impl From<String> for TermValue {
    fn from(s: String) -> Self {
        TermValue::Text(s)
    }
}

/// Drop repeated terms, keeping first occurrences. `1` and `"1"` are the same term.
fn dedupe_terms(terms: Vec<TermValue>) -> Vec<TermValue> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .filter(|t| seen.insert(t.to_string()))
        .collect()
}

/// First-order filter clause
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaxClause {
    pub taxonomy: String,
    pub terms: Vec<TermValue>,
    pub field: TermField,
    pub operator: TaxOperator,
}

impl TaxClause {
    pub fn new<S: Into<String>>(taxonomy: S) -> Self {
        Self {
            taxonomy: taxonomy.into(),
            ..Self::default()
        }
    }

    pub fn terms<I, T>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TermValue>,
    {
        self.terms = dedupe_terms(terms.into_iter().map(Into::into).collect());
        self
    }

    pub fn field(mut self, field: TermField) -> Self {
        self.field = field;
        self
    }

    pub fn operator(mut self, operator: TaxOperator) -> Self {
        self.operator = operator;
        self
    }
}

/// A node of the filter tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNode {
    Clause(TaxClause),
    Group(FilterGroup),
}

impl From<TaxClause> for FilterNode {
    fn from(clause: TaxClause) -> Self {
        FilterNode::Clause(clause)
    }
}

impl From<FilterGroup> for FilterNode {
    fn from(group: FilterGroup) -> Self {
        FilterNode::Group(group)
    }
}

/// Group of nodes joined by one relation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterGroup {
    pub relation: Relation,
    pub children: Vec<FilterNode>,
}

impl FilterGroup {
    pub fn new(relation: Relation) -> Self {
        Self {
            relation,
            children: Vec::new(),
        }
    }

    pub fn with<N: Into<FilterNode>>(mut self, node: N) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Originally requested terms for a taxonomy, before ID resolution
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueriedTerms {
    pub terms: Option<Vec<TermValue>>,
    pub field: Option<TermField>,
}

// ============================================================================
// TERM RESOLUTION
// ============================================================================

/// Answers the lookups the engine needs while compiling clauses
///
/// Implemented by [`crate::query::TermCatalog`]; the storage layer builds one
/// with [`crate::storage::terms::catalog_for`].
pub trait TermResolver {
    /// Whether `taxonomy` is a registered taxonomy slug
    fn taxonomy_exists(&self, taxonomy: &str) -> bool;

    /// IDs of the terms in `taxonomy` matching `terms` on `field`
    fn resolve_term_ids(&self, taxonomy: &str, field: &TermField, terms: &[TermValue]) -> Vec<i64>;
}

// ============================================================================
// COMPILED OUTPUT
// ============================================================================

/// JOIN and WHERE fragments for a primary query
///
/// `where_clause`, when not empty, starts with `" AND "` so it can follow `WHERE 1=1`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlClauses {
    pub join: String,
    pub where_clause: String,
}

impl SqlClauses {
    pub fn is_empty(&self) -> bool {
        self.join.is_empty() && self.where_clause.is_empty()
    }
}

/// Fragments produced by one clause
#[derive(Debug, Default)]
struct ClauseSql {
    join: Vec<String>,
    wheres: Vec<String>,
}

impl ClauseSql {
    fn no_results() -> Self {
        Self {
            join: vec![String::new()],
            wheres: vec![NO_RESULTS_WHERE.to_string()],
        }
    }

    fn single(join: String, where_sql: String) -> Self {
        Self {
            join: vec![join],
            wheres: vec![where_sql],
        }
    }
}

#[derive(Debug)]
enum ClauseError {
    InvalidTaxonomy(String),
}

impl fmt::Display for ClauseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClauseError::InvalidTaxonomy(t) if t.is_empty() => write!(f, "missing taxonomy"),
            ClauseError::InvalidTaxonomy(t) => write!(f, "invalid taxonomy '{}'", t),
        }
    }
}

// ============================================================================
// TAX QUERY
// ============================================================================

/// A sanitized taxonomy query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaxQuery {
    root: FilterGroup,
    queried_terms: BTreeMap<String, QueriedTerms>,
    tables: TableNames,
}

impl TaxQuery {
    /// Sanitize a raw tax query
    ///
    /// Never fails: malformed nodes are dropped and missing keys get defaults.
    /// A root that is itself a clause is wrapped in an `AND` group; an empty
    /// root object is an empty query.
    pub fn from_value(raw: &Value) -> Self {
        let root = match raw {
            Value::Object(map) if !map.is_empty() && is_first_order_clause(raw) => {
                FilterGroup::new(Relation::And).with(FilterNode::Clause(sanitize_clause(map)))
            }
            _ => sanitize_group(raw),
        };
        Self::from_tree(root)
    }

    /// Parse a JSON string and sanitize it
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(&value))
    }

    /// Build from an already typed tree
    pub fn from_tree(root: FilterGroup) -> Self {
        let mut queried_terms = BTreeMap::new();
        record_queried_terms(&root, &mut queried_terms);
        Self {
            root,
            queried_terms,
            tables: TableNames::default(),
        }
    }

    /// Generate SQL against different term/relationship tables
    pub fn with_tables(mut self, tables: TableNames) -> Self {
        self.tables = tables;
        self
    }

    /// Require `node` in addition to the current filter
    pub fn and<N: Into<FilterNode>>(self, node: N) -> Self {
        let tables = self.tables.clone();
        let root = if self.root.is_empty() {
            FilterGroup::new(Relation::And).with(node)
        } else {
            FilterGroup::new(Relation::And)
                .with(FilterNode::Group(self.root))
                .with(node)
        };
        Self::from_tree(root).with_tables(tables)
    }

    pub fn relation(&self) -> Relation {
        self.root.relation
    }

    pub fn root(&self) -> &FilterGroup {
        &self.root
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// First terms/field requested per taxonomy, excluding `NOT IN` clauses
    pub fn queried_terms(&self) -> &BTreeMap<String, QueriedTerms> {
        &self.queried_terms
    }

    /// Every taxonomy slug named by a clause
    pub fn taxonomies(&self) -> BTreeSet<String> {
        fn walk(group: &FilterGroup, out: &mut BTreeSet<String>) {
            for child in &group.children {
                match child {
                    FilterNode::Clause(c) if !c.taxonomy.is_empty() => {
                        out.insert(c.taxonomy.clone());
                    }
                    FilterNode::Clause(_) => {}
                    FilterNode::Group(g) => walk(g, out),
                }
            }
        }

        let mut out = BTreeSet::new();
        walk(&self.root, &mut out);
        out
    }

    /// Compile into JOIN/WHERE fragments for `primary_table.primary_id_column`
    ///
    /// Repeated calls return identical SQL; table aliases are numbered per call.
    pub fn get_sql(
        &self,
        primary_table: &str,
        primary_id_column: &str,
        resolver: &dyn TermResolver,
    ) -> SqlClauses {
        let mut ctx = CompileContext {
            tables: &self.tables,
            primary_table,
            primary_id_column,
            resolver,
            table_aliases: Vec::new(),
        };

        let mut sql = ctx.compile_group(&self.root, 0);
        if !sql.where_clause.is_empty() {
            sql.where_clause = format!(" AND {}", sql.where_clause);
        }
        sql
    }
}

// ============================================================================
// SANITIZATION
// ============================================================================

const CLAUSE_KEYS: [&str; 4] = ["terms", "taxonomy", "field", "operator"];

fn is_first_order_clause(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty() || CLAUSE_KEYS.iter().any(|k| map.contains_key(*k)),
        _ => false,
    }
}

fn sanitize_group(raw: &Value) -> FilterGroup {
    let mut group = FilterGroup::default();

    match raw {
        Value::Object(map) => {
            for (key, value) in map {
                if key == "relation" {
                    group.relation = value
                        .as_str()
                        .map(Relation::parse)
                        .unwrap_or_default();
                } else {
                    sanitize_child(value, &mut group.children);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                sanitize_child(item, &mut group.children);
            }
        }
        _ => {}
    }

    group
}

fn sanitize_child(value: &Value, children: &mut Vec<FilterNode>) {
    match value {
        Value::Object(map) if is_first_order_clause(value) => {
            children.push(FilterNode::Clause(sanitize_clause(map)));
        }
        Value::Object(_) => {
            let group = sanitize_group(value);
            if !group.is_empty() {
                children.push(FilterNode::Group(group));
            }
        }
        Value::Array(items) => {
            for item in items {
                sanitize_child(item, children);
            }
        }
        _ => {}
    }
}

fn sanitize_clause(map: &Map<String, Value>) -> TaxClause {
    let taxonomy = match map.get("taxonomy") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    let terms = match map.get("terms") {
        Some(Value::Array(items)) => items.iter().filter_map(TermValue::from_json).collect(),
        Some(scalar) => TermValue::from_json(scalar).into_iter().collect(),
        None => Vec::new(),
    };

    let field = match map.get("field") {
        Some(Value::String(s)) => TermField::parse(s),
        Some(Value::Null) | None => TermField::Id,
        Some(other) => TermField::Other(other.to_string()),
    };

    let operator = match map.get("operator") {
        Some(Value::String(s)) => TaxOperator::parse(s),
        Some(Value::Null) | None => TaxOperator::In,
        Some(other) => TaxOperator::Other(other.to_string()),
    };

    TaxClause {
        taxonomy,
        terms: dedupe_terms(terms),
        field,
        operator,
    }
}

fn record_queried_terms(group: &FilterGroup, out: &mut BTreeMap<String, QueriedTerms>) {
    for child in &group.children {
        match child {
            FilterNode::Clause(clause) => {
                if clause.taxonomy.is_empty() || clause.operator == TaxOperator::NotIn {
                    continue;
                }
                let entry = out.entry(clause.taxonomy.clone()).or_default();
                if !clause.terms.is_empty() && entry.terms.is_none() {
                    entry.terms = Some(clause.terms.clone());
                }
                if !clause.field.is_blank() && entry.field.is_none() {
                    entry.field = Some(clause.field.clone());
                }
            }
            FilterNode::Group(sub) => record_queried_terms(sub, out),
        }
    }
}

// ============================================================================
// COMPILATION
// ============================================================================

/// State threaded through one `get_sql` call
struct CompileContext<'a> {
    tables: &'a TableNames,
    primary_table: &'a str,
    primary_id_column: &'a str,
    resolver: &'a dyn TermResolver,
    /// Every relationship-table alias allocated so far, across the whole tree
    table_aliases: Vec<String>,
}

impl<'a> CompileContext<'a> {
    fn compile_group(&mut self, group: &FilterGroup, depth: usize) -> SqlClauses {
        let indent = "  ".repeat(depth);
        let mut joins: Vec<String> = Vec::new();
        let mut wheres: Vec<String> = Vec::new();

        // Alias of the first sibling clause that allocated a join
        let mut sibling_alias: Option<String> = None;

        for child in &group.children {
            match child {
                FilterNode::Clause(clause) => {
                    let clause_sql = self
                        .compile_clause(clause, group.relation, &mut sibling_alias)
                        .unwrap_or_else(|e| {
                            tracing::debug!(
                                taxonomy = %clause.taxonomy,
                                "tax clause matches nothing: {}",
                                e
                            );
                            ClauseSql::no_results()
                        });

                    match clause_sql.wheres.len() {
                        0 => wheres.push(String::new()),
                        1 => wheres.extend(clause_sql.wheres),
                        _ => wheres.push(format!("( {} )", clause_sql.wheres.join(" AND "))),
                    }
                    joins.extend(clause_sql.join);
                }
                FilterNode::Group(sub) => {
                    let sub_sql = self.compile_group(sub, depth + 1);
                    wheres.push(sub_sql.where_clause);
                    joins.push(sub_sql.join);
                }
            }
        }

        let mut seen = HashSet::new();
        let joins: Vec<String> = joins
            .into_iter()
            .filter(|j| !j.is_empty() && seen.insert(j.clone()))
            .collect();
        let wheres: Vec<String> = wheres.into_iter().filter(|w| !w.is_empty()).collect();

        let where_clause = if wheres.is_empty() {
            String::new()
        } else {
            let separator = format!(" \n  {indent}{} \n  {indent}", group.relation.as_sql());
            format!("( \n  {indent}{}\n{indent})", wheres.join(&separator))
        };

        SqlClauses {
            join: joins.join(" "),
            where_clause,
        }
    }

    fn compile_clause(
        &mut self,
        clause: &TaxClause,
        parent_relation: Relation,
        sibling_alias: &mut Option<String>,
    ) -> std::result::Result<ClauseSql, ClauseError> {
        let term_ids = self.resolve_clause_terms(clause)?;
        let relationships = self.tables.relationships.as_str();
        let primary = format!("{}.{}", self.primary_table, self.primary_id_column);
        let id_list = term_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let clause_sql = match &clause.operator {
            TaxOperator::In => {
                if term_ids.is_empty() {
                    return Ok(ClauseSql::no_results());
                }

                let reusable = match (parent_relation, sibling_alias.as_ref()) {
                    (Relation::Or, Some(alias)) => Some(alias.clone()),
                    _ => None,
                };

                let (alias, join) = match reusable {
                    Some(alias) => (alias, String::new()),
                    None => {
                        let i = self.table_aliases.len();
                        let alias = if i > 0 {
                            format!("tt{}", i)
                        } else {
                            relationships.to_string()
                        };
                        self.table_aliases.push(alias.clone());
                        if sibling_alias.is_none() {
                            *sibling_alias = Some(alias.clone());
                        }

                        let as_alias = if i > 0 { format!(" AS {}", alias) } else { String::new() };
                        let join = format!(
                            " LEFT JOIN {relationships}{as_alias} ON ({primary} = {alias}.{OBJECT_ID_COLUMN})"
                        );
                        (alias, join)
                    }
                };

                ClauseSql::single(join, format!("{alias}.{TERM_ID_COLUMN} IN ({id_list})"))
            }

            TaxOperator::NotIn => {
                if term_ids.is_empty() {
                    return Ok(ClauseSql::default());
                }

                ClauseSql::single(
                    String::new(),
                    format!(
                        "{primary} NOT IN ( SELECT {OBJECT_ID_COLUMN} FROM {relationships} WHERE {TERM_ID_COLUMN} IN ({id_list}) )"
                    ),
                )
            }

            TaxOperator::And => {
                if term_ids.is_empty() {
                    return Ok(ClauseSql::default());
                }

                ClauseSql::single(
                    String::new(),
                    format!(
                        "( SELECT COUNT(1) FROM {relationships} WHERE {TERM_ID_COLUMN} IN ({id_list}) AND {OBJECT_ID_COLUMN} = {primary} ) = {}",
                        term_ids.len()
                    ),
                )
            }

            TaxOperator::Exists | TaxOperator::NotExists => {
                let terms = self.tables.terms.as_str();
                ClauseSql::single(
                    String::new(),
                    format!(
                        "{} ( SELECT 1 FROM {relationships} INNER JOIN {terms} ON {terms}.id = {relationships}.{TERM_ID_COLUMN} WHERE {terms}.taxonomy = {} AND {relationships}.{OBJECT_ID_COLUMN} = {primary} )",
                        clause.operator,
                        quote_literal(&clause.taxonomy)
                    ),
                )
            }

            TaxOperator::Other(raw) => {
                tracing::debug!(operator = %raw, "unsupported tax operator ignored");
                ClauseSql::default()
            }
        };

        Ok(clause_sql)
    }

    /// Validate the taxonomy and turn the clause's terms into term IDs
    fn resolve_clause_terms(&self, clause: &TaxClause) -> std::result::Result<Vec<i64>, ClauseError> {
        if clause.taxonomy.is_empty() {
            if !clause.field.is_id() {
                return Err(ClauseError::InvalidTaxonomy(String::new()));
            }
        } else if !self.resolver.taxonomy_exists(&clause.taxonomy) {
            return Err(ClauseError::InvalidTaxonomy(clause.taxonomy.clone()));
        }

        let terms = dedupe_terms(clause.terms.clone());
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        if clause.field.is_id() {
            let mut seen = HashSet::new();
            return Ok(terms
                .iter()
                .filter_map(TermValue::as_id)
                .filter(|id| seen.insert(*id))
                .collect());
        }

        let wanted: Vec<TermValue> = terms.into_iter().filter(|t| !t.is_falsy()).collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .resolver
            .resolve_term_ids(&clause.taxonomy, &clause.field, &wanted))
    }
}

/// Quote a string as a SQL literal
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TermCatalog;
    use serde_json::json;

    fn catalog() -> TermCatalog {
        TermCatalog::new(["author", "genre", "source"])
            .with_term(3, "author", "Jane Doe", "jane-doe")
            .with_term(4, "author", "John Roe", "john-roe")
            .with_term(5, "genre", "Fantasy", "fantasy")
            .with_term(7, "genre", "Science Fiction", "science-fiction")
            .with_term(9, "genre", "Horror", "horror")
    }

    fn compile(raw: Value) -> SqlClauses {
        TaxQuery::from_value(&raw).get_sql("books", "ID", &catalog())
    }

    /// Collapse whitespace so assertions don't depend on indentation
    fn squash(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_relation_parse() {
        assert_eq!(Relation::parse("or"), Relation::Or);
        assert_eq!(Relation::parse(" OR "), Relation::Or);
        assert_eq!(Relation::parse("XOR"), Relation::And);
        assert_eq!(Relation::parse(""), Relation::And);
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!(TaxOperator::parse("not in"), TaxOperator::NotIn);
        assert_eq!(TaxOperator::parse("NOT   EXISTS"), TaxOperator::NotExists);
        assert_eq!(TaxOperator::parse("LIKE"), TaxOperator::Other("LIKE".into()));
    }

    #[test]
    fn test_empty_query_has_no_restriction() {
        assert_eq!(compile(json!({})).where_clause, "");
        assert_eq!(compile(json!({"relation": "OR"})), SqlClauses::default());
        assert_eq!(compile(json!([])), SqlClauses::default());
    }

    #[test]
    fn test_single_in_clause() {
        let sql = TaxQuery::from_value(&json!([
            {"taxonomy": "genre", "terms": [5, 7], "field": "id", "operator": "IN"}
        ]))
        .with_tables(TableNames::new("terms", "relationships"))
        .get_sql("books", "ID", &catalog());

        assert_eq!(
            sql.join,
            " LEFT JOIN relationships ON (books.ID = relationships.book_id)"
        );
        assert_eq!(
            sql.where_clause,
            " AND ( \n  relationships.term_id IN (5,7)\n)"
        );
    }

    #[test]
    fn test_bare_clause_root() {
        let sql = compile(json!({"taxonomy": "genre", "terms": [5, 7], "field": "id", "operator": "IN"}));
        assert_eq!(
            sql.join,
            " LEFT JOIN book_term_relationships ON (books.ID = book_term_relationships.book_id)"
        );
        assert_eq!(
            squash(&sql.where_clause),
            "AND ( book_term_relationships.term_id IN (5,7) )"
        );

        let tax = TaxQuery::from_value(&json!({"taxonomy": "genre", "terms": [5], "field": "id"}));
        assert_eq!(tax.relation(), Relation::And);
        assert_eq!(tax.root().children.len(), 1);
        assert!(tax.queried_terms().contains_key("genre"));
    }

    #[test]
    fn test_bare_clause_root_with_empty_terms_matches_nothing() {
        let sql = compile(json!({"taxonomy": "genre", "terms": []}));
        assert_eq!(sql.join, "");
        assert_eq!(squash(&sql.where_clause), "AND ( 0 = 1 )");

        let sql = compile(json!({"taxonomy": "genre", "terms": [], "operator": "NOT IN"}));
        assert_eq!(sql, SqlClauses::default());
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let sql = compile(json!([{"taxonomy": "genre", "terms": []}]));
        assert_eq!(sql.join, "");
        assert_eq!(squash(&sql.where_clause), "AND ( 0 = 1 )");
    }

    #[test]
    fn test_empty_not_in_has_no_restriction() {
        let sql = compile(json!([{"taxonomy": "genre", "terms": [], "operator": "NOT IN"}]));
        assert_eq!(sql, SqlClauses::default());
    }

    #[test]
    fn test_empty_and_has_no_restriction() {
        let sql = compile(json!([{"taxonomy": "genre", "terms": [], "operator": "AND"}]));
        assert_eq!(sql.where_clause, "");
    }

    #[test]
    fn test_empty_clause_object_matches_nothing() {
        let sql = compile(json!([{}]));
        assert_eq!(squash(&sql.where_clause), "AND ( 0 = 1 )");
    }

    #[test]
    fn test_or_siblings_share_one_join() {
        let sql = compile(json!({
            "relation": "OR",
            "a": {"taxonomy": "genre", "terms": [5]},
            "b": {"taxonomy": "author", "terms": [3]}
        }));

        assert_eq!(sql.join.matches("LEFT JOIN").count(), 1);
        assert_eq!(
            squash(&sql.where_clause),
            "AND ( book_term_relationships.term_id IN (5) OR book_term_relationships.term_id IN (3) )"
        );
    }

    #[test]
    fn test_and_siblings_get_distinct_aliases() {
        let sql = compile(json!({
            "relation": "AND",
            "a": {"taxonomy": "genre", "terms": [5]},
            "b": {"taxonomy": "author", "terms": [3]}
        }));

        assert_eq!(sql.join.matches("LEFT JOIN").count(), 2);
        assert!(sql
            .join
            .contains("LEFT JOIN book_term_relationships ON (books.ID = book_term_relationships.book_id)"));
        assert!(sql
            .join
            .contains("LEFT JOIN book_term_relationships AS tt1 ON (books.ID = tt1.book_id)"));
        assert_eq!(
            squash(&sql.where_clause),
            "AND ( book_term_relationships.term_id IN (5) AND tt1.term_id IN (3) )"
        );
    }

    #[test]
    fn test_alias_counter_is_global_across_subtrees() {
        let sql = compile(json!({
            "relation": "AND",
            "a": {"taxonomy": "genre", "terms": [5]},
            "b": {
                "relation": "OR",
                "x": {"taxonomy": "author", "terms": [3]},
                "y": {"taxonomy": "author", "terms": [4]}
            },
            "c": {"taxonomy": "genre", "terms": [7]}
        }));

        // genre 5 -> table name, nested OR pair -> tt1 shared, genre 7 -> tt2
        assert_eq!(sql.join.matches("LEFT JOIN").count(), 3);
        assert!(sql.join.contains("AS tt1 ON"));
        assert!(sql.join.contains("AS tt2 ON"));
        assert_eq!(
            squash(&sql.where_clause),
            "AND ( book_term_relationships.term_id IN (5) AND ( tt1.term_id IN (3) OR tt1.term_id IN (4) ) AND tt2.term_id IN (7) )"
        );
    }

    #[test]
    fn test_nested_group_indentation() {
        let sql = compile(json!({
            "relation": "OR",
            "a": {"taxonomy": "genre", "terms": [9], "operator": "NOT IN"},
            "b": {"relation": "AND", "c": {"taxonomy": "genre", "terms": [5], "operator": "AND"}}
        }));

        let expected = " AND ( \n  books.ID NOT IN ( SELECT book_id FROM book_term_relationships WHERE term_id IN (9) ) \n  OR \n  ( \n    ( SELECT COUNT(1) FROM book_term_relationships WHERE term_id IN (5) AND book_id = books.ID ) = 1\n  )\n)";
        assert_eq!(sql.where_clause, expected);
        assert_eq!(sql.join, "");
    }

    #[test]
    fn test_clauses_list_under_relation() {
        let sql = compile(json!({
            "relation": "AND",
            "clauses": [
                {"taxonomy": "author", "terms": [3]},
                {"taxonomy": "genre", "terms": [9], "operator": "NOT IN"}
            ]
        }));

        assert_eq!(
            sql.join,
            " LEFT JOIN book_term_relationships ON (books.ID = book_term_relationships.book_id)"
        );
        assert_eq!(
            squash(&sql.where_clause),
            "AND ( book_term_relationships.term_id IN (3) AND books.ID NOT IN ( SELECT book_id FROM book_term_relationships WHERE term_id IN (9) ) )"
        );
    }

    #[test]
    fn test_duplicate_terms_compile_identically() {
        let a = compile(json!([{"taxonomy": "genre", "terms": [5, 5, 7]}]));
        let b = compile(json!([{"taxonomy": "genre", "terms": [5, 7]}]));
        let c = compile(json!([{"taxonomy": "genre", "terms": ["5", 5, 7]}]));
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_scalar_terms_become_a_list() {
        let query = TaxQuery::from_value(&json!([{"taxonomy": "genre", "terms": 5}]));
        match &query.root().children[0] {
            FilterNode::Clause(c) => assert_eq!(c.terms, vec![TermValue::Id(5)]),
            other => panic!("expected clause, got {:?}", other),
        }
    }

    #[test]
    fn test_get_sql_is_repeatable() {
        let query = TaxQuery::from_value(&json!({
            "relation": "AND",
            "a": {"taxonomy": "genre", "terms": [5]},
            "b": {"taxonomy": "author", "terms": [3]}
        }));
        let resolver = catalog();
        let first = query.get_sql("books", "ID", &resolver);
        let second = query.get_sql("books", "ID", &resolver);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_taxonomy_matches_nothing() {
        let sql = compile(json!([{"taxonomy": "nonexistent", "terms": [1]}]));
        assert_eq!(sql.join, "");
        assert_eq!(squash(&sql.where_clause), "AND ( 0 = 1 )");
    }

    #[test]
    fn test_unknown_taxonomy_under_and_sinks_the_group() {
        let sql = compile(json!({
            "relation": "AND",
            "a": {"taxonomy": "genre", "terms": [5]},
            "b": {"taxonomy": "nonexistent", "terms": [1]}
        }));
        assert_eq!(
            squash(&sql.where_clause),
            "AND ( book_term_relationships.term_id IN (5) AND 0 = 1 )"
        );
    }

    #[test]
    fn test_missing_taxonomy_requires_id_field() {
        let by_id = compile(json!([{"terms": [5]}]));
        assert_eq!(squash(&by_id.where_clause), "AND ( book_term_relationships.term_id IN (5) )");

        let by_slug = compile(json!([{"terms": ["fantasy"], "field": "slug"}]));
        assert_eq!(squash(&by_slug.where_clause), "AND ( 0 = 1 )");
    }

    #[test]
    fn test_slug_and_name_resolution() {
        let by_slug = compile(json!([{"taxonomy": "genre", "terms": ["fantasy", "horror"], "field": "slug"}]));
        assert!(by_slug.where_clause.contains("term_id IN (5,9)"));

        let by_name = compile(json!([{"taxonomy": "author", "terms": ["jane doe"], "field": "name"}]));
        assert!(by_name.where_clause.contains("term_id IN (3)"));
    }

    #[test]
    fn test_search_resolution() {
        let sql = compile(json!([{"taxonomy": "genre", "terms": "fiction", "field": "search"}]));
        assert!(sql.where_clause.contains("term_id IN (7)"));
    }

    #[test]
    fn test_unresolvable_slugs_follow_empty_terms_rules() {
        let in_clause = compile(json!([{"taxonomy": "genre", "terms": ["romance"], "field": "slug"}]));
        assert_eq!(squash(&in_clause.where_clause), "AND ( 0 = 1 )");

        let not_in = compile(json!([{
            "taxonomy": "genre", "terms": ["romance"], "field": "slug", "operator": "NOT IN"
        }]));
        assert_eq!(not_in, SqlClauses::default());

        let falsy = compile(json!([{"taxonomy": "genre", "terms": ["", "0"], "field": "slug"}]));
        assert_eq!(squash(&falsy.where_clause), "AND ( 0 = 1 )");
    }

    #[test]
    fn test_exists_operators() {
        let sql = compile(json!([{"taxonomy": "source", "operator": "NOT EXISTS"}]));
        assert_eq!(
            squash(&sql.where_clause),
            "AND ( NOT EXISTS ( SELECT 1 FROM book_term_relationships INNER JOIN book_terms ON book_terms.id = book_term_relationships.term_id WHERE book_terms.taxonomy = 'source' AND book_term_relationships.book_id = books.ID ) )"
        );
    }

    #[test]
    fn test_unknown_operator_is_ignored() {
        let sql = compile(json!([{"taxonomy": "genre", "terms": [5], "operator": "LIKE"}]));
        assert_eq!(sql, SqlClauses::default());
    }

    #[test]
    fn test_malformed_nodes_are_dropped() {
        let query = TaxQuery::from_value(&json!({
            "relation": "or",
            "junk": "string",
            "n": 42,
            "empty_group": {"relation": "AND"},
            "a": {"taxonomy": "genre", "terms": [5]}
        }));
        assert_eq!(query.relation(), Relation::Or);
        assert_eq!(query.root().children.len(), 1);
    }

    #[test]
    fn test_nested_groups_default_to_and() {
        let query = TaxQuery::from_value(&json!({
            "relation": "OR",
            "g": {"x": {"taxonomy": "genre", "terms": [5]}, "y": {"taxonomy": "genre", "terms": [7]}}
        }));
        match &query.root().children[0] {
            FilterNode::Group(g) => assert_eq!(g.relation, Relation::And),
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_queried_terms_keeps_first_clause() {
        let query = TaxQuery::from_value(&json!([
            {"taxonomy": "genre", "terms": [], "field": "id"},
            {"taxonomy": "genre", "terms": ["fantasy"], "field": "slug"},
            {"taxonomy": "author", "terms": [3], "operator": "NOT IN"},
            {"relation": "OR", "x": {"taxonomy": "author", "terms": ["Jane Doe"], "field": "name"}}
        ]));

        let queried = query.queried_terms();
        let genre = &queried["genre"];
        assert_eq!(genre.terms, Some(vec![TermValue::from("fantasy")]));
        assert_eq!(genre.field, Some(TermField::Id));

        let author = &queried["author"];
        assert_eq!(author.terms, Some(vec![TermValue::from("Jane Doe")]));
        assert_eq!(author.field, Some(TermField::Name));
    }

    #[test]
    fn test_and_composes_filters() {
        let query = TaxQuery::from_value(&json!([{"taxonomy": "genre", "terms": [5]}]))
            .and(TaxClause::new("author").terms([3]));
        let sql = query.get_sql("books", "ID", &catalog());
        assert_eq!(
            squash(&sql.where_clause),
            "AND ( ( book_term_relationships.term_id IN (5) ) AND tt1.term_id IN (3) )"
        );
        assert_eq!(
            query.taxonomies().into_iter().collect::<Vec<_>>(),
            vec!["author".to_string(), "genre".to_string()]
        );
    }

    #[test]
    fn test_literal_quoting() {
        assert_eq!(quote_literal("o'neil"), "'o''neil'");
    }

    #[test]
    fn test_from_json_str_rejects_invalid_json() {
        assert!(TaxQuery::from_json_str("{not json").is_err());
        let query = TaxQuery::from_json_str(r#"[{"taxonomy":"genre","terms":[5]}]"#).unwrap();
        assert!(!query.is_empty());
    }
}
