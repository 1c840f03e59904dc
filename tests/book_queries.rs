//! Integration tests for book listing with tax queries
//!
//! Runs against a file-backed database so the pooled, multi-connection
//! configuration is exercised as well.

use book_database::query::{BookOrderBy, BookQuery, TaxClause, TaxOperator, TaxQuery, TermField};
use book_database::storage::models::{BookInput, Order, ReadingEntryInput};
use book_database::storage::{books, reading, terms, Database, TermFilter};
use serde_json::json;
use tempfile::TempDir;

struct Library {
    db: Database,
    _dir: TempDir,
}

async fn seeded_library() -> Library {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::new(dir.path().join("books.db"))
        .await
        .expect("Failed to create database");

    let fixtures = [
        BookInput::new("The Hobbit")
            .pub_date("1937-09-21")
            .pages(310)
            .terms("author", ["J.R.R. Tolkien"])
            .terms("genre", ["Fantasy"])
            .terms("publisher", ["Allen & Unwin"]),
        BookInput::new("The Fellowship of the Ring")
            .series("The Lord of the Rings", Some("1"))
            .pub_date("1954-07-29")
            .pages(423)
            .terms("author", ["J.R.R. Tolkien"])
            .terms("genre", ["Fantasy"])
            .terms("publisher", ["Allen & Unwin"]),
        BookInput::new("It")
            .pub_date("1986-09-15")
            .pages(1138)
            .terms("author", ["Stephen King"])
            .terms("genre", ["Horror"]),
        BookInput::new("Good Omens")
            .pub_date("1990-05-01")
            .pages(288)
            .terms("author", ["Terry Pratchett", "Neil Gaiman"])
            .terms("genre", ["Fantasy", "Comedy"]),
        BookInput::new("A Brief History of Time").pages(256),
    ];

    for input in &fixtures {
        books::save_book(&db, input).await.expect("Failed to save book");
    }

    Library { db, _dir: dir }
}

async fn titles(db: &Database, query: BookQuery) -> Vec<String> {
    query
        .orderby(BookOrderBy::Title)
        .order(Order::Asc)
        .number(0)
        .fetch(db)
        .await
        .expect("Failed to fetch books")
        .into_iter()
        .map(|b| b.title)
        .collect()
}

#[tokio::test]
async fn test_or_of_genres() {
    let lib = seeded_library().await;

    let found = titles(
        &lib.db,
        BookQuery::new().tax_query(json!({
            "relation": "OR",
            "0": {"taxonomy": "genre", "terms": ["horror"], "field": "slug"},
            "1": {"taxonomy": "genre", "terms": ["comedy"], "field": "slug"}
        })),
    )
    .await;

    assert_eq!(found, vec!["Good Omens", "It"]);
}

#[tokio::test]
async fn test_and_across_taxonomies_with_nested_or() {
    let lib = seeded_library().await;

    let found = titles(
        &lib.db,
        BookQuery::new().tax_query(json!({
            "relation": "AND",
            "0": {"taxonomy": "genre", "terms": ["Fantasy"], "field": "name"},
            "1": {
                "relation": "OR",
                "0": {"taxonomy": "author", "terms": ["neil-gaiman"], "field": "slug"},
                "1": {"taxonomy": "publisher", "terms": ["allen-unwin"], "field": "slug"}
            }
        })),
    )
    .await;

    assert_eq!(found, vec!["Good Omens", "The Fellowship of the Ring", "The Hobbit"]);
}

#[tokio::test]
async fn test_and_operator_requires_every_term() {
    let lib = seeded_library().await;

    let found = titles(
        &lib.db,
        BookQuery::new().tax_query(json!([
            {"taxonomy": "author", "terms": ["terry-pratchett", "neil-gaiman"], "field": "slug", "operator": "AND"}
        ])),
    )
    .await;
    assert_eq!(found, vec!["Good Omens"]);

    let none = titles(
        &lib.db,
        BookQuery::new().tax_query(json!([
            {"taxonomy": "author", "terms": ["terry-pratchett", "stephen-king"], "field": "slug", "operator": "AND"}
        ])),
    )
    .await;
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_exists_and_not_exists() {
    let lib = seeded_library().await;

    let with_publisher = titles(
        &lib.db,
        BookQuery::new().tax_query(json!([{"taxonomy": "publisher", "operator": "EXISTS"}])),
    )
    .await;
    assert_eq!(with_publisher, vec!["The Fellowship of the Ring", "The Hobbit"]);

    let without_author = titles(
        &lib.db,
        BookQuery::new().tax_query(json!([{"taxonomy": "author", "operator": "NOT EXISTS"}])),
    )
    .await;
    assert_eq!(without_author, vec!["A Brief History of Time"]);
}

#[tokio::test]
async fn test_not_in_keeps_untagged_books() {
    let lib = seeded_library().await;

    let found = titles(
        &lib.db,
        BookQuery::new().tax_query(json!([
            {"taxonomy": "genre", "terms": ["fantasy"], "field": "slug", "operator": "NOT IN"}
        ])),
    )
    .await;

    assert_eq!(found, vec!["A Brief History of Time", "It"]);
}

#[tokio::test]
async fn test_author_filter_combines_with_tax_query() {
    let lib = seeded_library().await;

    let found = titles(
        &lib.db,
        BookQuery::new()
            .author_name("tolkien")
            .tax_query(json!([{"taxonomy": "publisher", "operator": "EXISTS"}]))
            .series_name("lord"),
    )
    .await;

    assert_eq!(found, vec!["The Fellowship of the Ring"]);
}

#[tokio::test]
async fn test_paging_and_ordering() {
    let lib = seeded_library().await;

    let longest = BookQuery::new()
        .orderby(BookOrderBy::Pages)
        .order(Order::Desc)
        .number(2)
        .fetch(&lib.db)
        .await
        .expect("fetch");
    let pages: Vec<Option<i64>> = longest.iter().map(|b| b.pages).collect();
    assert_eq!(pages, vec![Some(1138), Some(423)]);

    let second_page = BookQuery::new()
        .orderby(BookOrderBy::Pages)
        .order(Order::Desc)
        .number(2)
        .offset(2)
        .fetch(&lib.db)
        .await
        .expect("fetch");
    assert_eq!(second_page[0].pages, Some(310));

    assert_eq!(BookQuery::new().number(1).count(&lib.db).await.expect("count"), 5);
}

#[tokio::test]
async fn test_typed_tax_query_matches_json() {
    let lib = seeded_library().await;

    let typed = TaxQuery::default()
        .and(TaxClause::new("genre").terms(["horror"]).field(TermField::Slug))
        .with_tables(lib.db.tables().clone());
    let catalog = terms::catalog_for(&lib.db, &typed).await.expect("catalog");
    let sql = typed.get_sql("books", "id", &catalog);

    let raw = TaxQuery::from_value(&json!([
        {"taxonomy": "genre", "terms": ["horror"], "field": "slug", "operator": "IN"}
    ]));
    let catalog = terms::catalog_for(&lib.db, &raw).await.expect("catalog");

    assert_eq!(raw.get_sql("books", "id", &catalog).join, sql.join);
    assert_eq!(raw.queried_terms()["genre"].field, Some(TermField::Slug));
    assert_eq!(TaxOperator::parse("not in"), TaxOperator::NotIn);
}

#[tokio::test]
async fn test_retagging_updates_queries_and_counts() {
    let lib = seeded_library().await;

    let it = BookQuery::new().title("It").fetch(&lib.db).await.expect("fetch");
    let it_id = it
        .iter()
        .find(|b| b.title == "It")
        .map(|b| b.id)
        .expect("It is seeded");

    books::save_book(
        &lib.db,
        &BookInput {
            id: Some(it_id),
            ..BookInput::new("It")
                .terms("author", ["Stephen King"])
                .terms("genre", ["Horror", "Coming of Age"])
        },
    )
    .await
    .expect("Failed to update book");

    let coming_of_age = titles(
        &lib.db,
        BookQuery::new().tax_query(json!([
            {"taxonomy": "genre", "terms": ["coming-of-age"], "field": "slug"}
        ])),
    )
    .await;
    assert_eq!(coming_of_age, vec!["It"]);

    let fantasy = terms::list_terms(&lib.db, &TermFilter::default().taxonomy("genre").slug_in(["fantasy"]))
        .await
        .expect("list");
    assert_eq!(fantasy[0].count, 3);

    books::delete_book(&lib.db, it_id).await.expect("delete");
    let horror = terms::list_terms(&lib.db, &TermFilter::default().taxonomy("genre").slug_in(["horror"]))
        .await
        .expect("list");
    assert_eq!(horror[0].count, 0);
}

#[tokio::test]
async fn test_library_survives_reopen() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("books.db");

    let book_id = {
        let db = Database::new(&path).await.expect("Failed to create database");
        let id = books::save_book(
            &db,
            &BookInput::new("The Left Hand of Darkness").terms("author", ["Ursula K. Le Guin"]),
        )
        .await
        .expect("save");
        reading::insert_reading_entry(
            &db,
            &ReadingEntryInput {
                book_id: id,
                date_started: Some("2024-03-01".into()),
                percentage_complete: Some(20),
                ..Default::default()
            },
        )
        .await
        .expect("log");
        db.close().await.expect("close");
        id
    };

    let db = Database::new(&path).await.expect("Failed to reopen database");
    let found = BookQuery::new().author_name("le guin").fetch(&db).await.expect("fetch");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, book_id);
    assert_eq!(reading::get_book_reading_list(&db, book_id).await.expect("list").len(), 1);
    assert!(db.check_integrity().await.expect("integrity"));
}
