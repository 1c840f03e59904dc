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


//! In-memory snapshot of taxonomies and terms used to resolve tax clauses

use super::tax::{TermField, TermResolver, TermValue};
use crate::storage::models::Term;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CatalogTerm {
    id: i64,
    taxonomy: String,
    name: String,
    slug: String,
}

/// Registered taxonomies plus the terms a query may refer to
#[derive(Debug, Clone, Default)]
pub struct TermCatalog {
    taxonomies: BTreeSet<String>,
    terms: Vec<CatalogTerm>,
}

impl TermCatalog {
    pub fn new<I, S>(taxonomies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            taxonomies: taxonomies.into_iter().map(Into::into).collect(),
            terms: Vec::new(),
        }
    }

    pub fn with_term(mut self, id: i64, taxonomy: &str, name: &str, slug: &str) -> Self {
        self.push(CatalogTerm {
            id,
            taxonomy: taxonomy.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
        });
        self
    }

    pub fn insert(&mut self, term: &Term) {
        self.push(CatalogTerm {
            id: term.id,
            taxonomy: term.taxonomy.clone(),
            name: term.name.clone(),
            slug: term.slug.clone(),
        });
    }

    fn push(&mut self, term: CatalogTerm) {
        if self.terms.iter().any(|t| t.id == term.id) {
            return;
        }
        let at = self.terms.partition_point(|t| t.id < term.id);
        self.terms.insert(at, term);
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    fn in_taxonomy<'a>(&'a self, taxonomy: &'a str) -> impl Iterator<Item = &'a CatalogTerm> + 'a {
        self.terms
            .iter()
            .filter(move |t| taxonomy.is_empty() || t.taxonomy == taxonomy)
    }
}

impl TermResolver for TermCatalog {
    fn taxonomy_exists(&self, taxonomy: &str) -> bool {
        self.taxonomies.contains(taxonomy)
    }

    fn resolve_term_ids(&self, taxonomy: &str, field: &TermField, terms: &[TermValue]) -> Vec<i64> {
        let texts: Vec<String> = terms.iter().map(|t| t.to_string().to_lowercase()).collect();

        let ids: Vec<i64> = match field {
            TermField::Slug => self
                .in_taxonomy(taxonomy)
                .filter(|t| texts.contains(&t.slug.to_lowercase()))
                .map(|t| t.id)
                .collect(),
            TermField::Name => self
                .in_taxonomy(taxonomy)
                .filter(|t| texts.contains(&t.name.trim().to_lowercase()))
                .map(|t| t.id)
                .collect(),
            TermField::Search => {
                let needle = texts.join(" ");
                self.in_taxonomy(taxonomy)
                    .filter(|t| {
                        t.name.to_lowercase().contains(&needle)
                            || t.slug.to_lowercase().contains(&needle)
                    })
                    .map(|t| t.id)
                    .collect()
            }
            TermField::Id | TermField::Other(_) => {
                let wanted: HashSet<i64> = terms.iter().filter_map(TermValue::as_id).collect();
                self.in_taxonomy(taxonomy)
                    .filter(|t| wanted.contains(&t.id))
                    .map(|t| t.id)
                    .collect()
            }
        };

        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terms_kept_sorted_and_unique() {
        let catalog = TermCatalog::new(["genre"])
            .with_term(9, "genre", "Horror", "horror")
            .with_term(2, "genre", "Fantasy", "fantasy")
            .with_term(9, "genre", "Horror", "horror");
        assert_eq!(catalog.term_count(), 2);

        let ids = catalog.resolve_term_ids(
            "genre",
            &TermField::Slug,
            &["horror".into(), "fantasy".into()],
        );
        assert_eq!(ids, vec![2, 9]);
    }

    #[test]
    fn test_lookups_are_scoped_to_taxonomy() {
        let catalog = TermCatalog::new(["genre", "author"])
            .with_term(1, "genre", "Mystery", "mystery")
            .with_term(2, "author", "Mystery", "mystery");

        assert_eq!(
            catalog.resolve_term_ids("author", &TermField::Name, &["mystery".into()]),
            vec![2]
        );
        assert_eq!(
            catalog.resolve_term_ids("author", &TermField::Other("term_taxonomy_id".into()), &[1.into(), 2.into()]),
            vec![2]
        );
    }

    #[test]
    fn test_unknown_taxonomy() {
        let catalog = TermCatalog::new(["genre"]);
        assert!(catalog.taxonomy_exists("genre"));
        assert!(!catalog.taxonomy_exists("mood"));
    }
}
