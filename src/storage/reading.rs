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


//! Reading list: when a book was started and finished, and how far along it is

use crate::error::{BookDbError, Result};
use crate::storage::books::book_exists;
use crate::storage::database::Database;
use crate::storage::models::{format_date, parse_date_input, ReadingEntry, ReadingEntryInput};

/// Insert a reading entry, or update it when `input.id` is set
///
/// Returns the entry ID.
pub async fn insert_reading_entry(db: &Database, input: &ReadingEntryInput) -> Result<i64> {
    if !book_exists(db, input.book_id).await? {
        return Err(BookDbError::not_found(format!("Book {}", input.book_id)));
    }

    if let Some(pct) = input.percentage_complete {
        if !(0..=100).contains(&pct) {
            return Err(BookDbError::invalid_input(format!(
                "percentage_complete must be between 0 and 100, got {}",
                pct
            )));
        }
    }

    let date_started = parse_date_input("date_started", input.date_started.as_deref())?.map(|d| format_date(&d));
    let date_finished = parse_date_input("date_finished", input.date_finished.as_deref())?.map(|d| format_date(&d));
    let review_id = input.review_id.filter(|id| *id > 0);
    let user_id = input.user_id.max(0);

    match input.id.filter(|id| *id > 0) {
        Some(id) => {
            let updated = sqlx::query(
                r#"
                UPDATE reading_log SET
                    book_id = ?, review_id = ?, user_id = ?, date_started = ?, date_finished = ?,
                    percentage_complete = COALESCE(?, percentage_complete)
                WHERE id = ?
                "#,
            )
            .bind(input.book_id)
            .bind(review_id)
            .bind(user_id)
            .bind(&date_started)
            .bind(&date_finished)
            .bind(input.percentage_complete)
            .bind(id)
            .execute(db.pool())
            .await?
            .rows_affected();

            if updated == 0 {
                return Err(BookDbError::not_found(format!("Reading entry {}", id)));
            }
            Ok(id)
        }
        None => {
            let result = sqlx::query(
                r#"
                INSERT INTO reading_log (
                    book_id, review_id, user_id, date_started, date_finished, percentage_complete
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(input.book_id)
            .bind(review_id)
            .bind(user_id)
            .bind(&date_started)
            .bind(&date_finished)
            .bind(input.percentage_complete.unwrap_or(0))
            .execute(db.pool())
            .await?;

            tracing::debug!(book_id = input.book_id, "reading entry added");
            Ok(result.last_insert_rowid())
        }
    }
}

pub async fn get_reading_entry(db: &Database, id: i64) -> Result<Option<ReadingEntry>> {
    let entry = sqlx::query_as::<_, ReadingEntry>("SELECT * FROM reading_log WHERE id = ?")
        .bind(id)
        .fetch_optional(db.pool())
        .await?;

    Ok(entry)
}

/// All reading entries for a book, oldest first
pub async fn get_book_reading_list(db: &Database, book_id: i64) -> Result<Vec<ReadingEntry>> {
    let entries = sqlx::query_as::<_, ReadingEntry>(
        "SELECT * FROM reading_log WHERE book_id = ? ORDER BY date_started IS NULL, date_started ASC, id ASC",
    )
    .bind(book_id)
    .fetch_all(db.pool())
    .await?;

    Ok(entries)
}

pub async fn delete_reading_entry(db: &Database, id: i64) -> Result<bool> {
    let removed = sqlx::query("DELETE FROM reading_log WHERE id = ?")
        .bind(id)
        .execute(db.pool())
        .await?
        .rows_affected();

    Ok(removed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::books::{delete_book, save_book};
    use crate::storage::models::BookInput;

    #[tokio::test]
    async fn test_reading_entry_lifecycle() {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        let book_id = save_book(&db, &BookInput::new("Piranesi")).await.expect("save");

        let id = insert_reading_entry(
            &db,
            &ReadingEntryInput {
                book_id,
                user_id: 1,
                date_started: Some("2021-01-02".into()),
                percentage_complete: Some(40),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to insert entry");

        let entry = get_reading_entry(&db, id).await.expect("get").expect("missing");
        assert_eq!(entry.percentage_complete, 40);
        assert!(entry.review_id.is_none());
        assert!(!entry.is_finished());

        let finished = insert_reading_entry(
            &db,
            &ReadingEntryInput {
                id: Some(id),
                book_id,
                user_id: 1,
                date_started: Some("2021-01-02".into()),
                date_finished: Some("2021-01-20 21:30:00".into()),
                percentage_complete: Some(100),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update entry");
        assert_eq!(finished, id);

        let entry = get_reading_entry(&db, id).await.expect("get").expect("missing");
        assert!(entry.is_finished());
        assert_eq!(
            entry.date_finished.map(|d| format_date(&d)).as_deref(),
            Some("2021-01-20 21:30:00")
        );

        assert_eq!(get_book_reading_list(&db, book_id).await.expect("list").len(), 1);
        assert!(delete_reading_entry(&db, id).await.expect("delete"));
        assert!(get_book_reading_list(&db, book_id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_percentage_when_omitted() {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        let book_id = save_book(&db, &BookInput::new("Circe")).await.expect("save");

        let id = insert_reading_entry(
            &db,
            &ReadingEntryInput {
                book_id,
                percentage_complete: Some(55),
                ..Default::default()
            },
        )
        .await
        .expect("insert");

        insert_reading_entry(
            &db,
            &ReadingEntryInput {
                id: Some(id),
                book_id,
                review_id: Some(7),
                ..Default::default()
            },
        )
        .await
        .expect("update");

        let entry = get_reading_entry(&db, id).await.expect("get").expect("missing");
        assert_eq!(entry.percentage_complete, 55);
        assert_eq!(entry.review_id, Some(7));
    }

    #[tokio::test]
    async fn test_reading_entry_validation() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let err = insert_reading_entry(&db, &ReadingEntryInput { book_id: 42, ..Default::default() })
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let book_id = save_book(&db, &BookInput::new("Sula")).await.expect("save");
        let err = insert_reading_entry(
            &db,
            &ReadingEntryInput {
                book_id,
                percentage_complete: Some(150),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_validation_error());

        let err = insert_reading_entry(
            &db,
            &ReadingEntryInput {
                book_id,
                date_started: Some("the other day".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BookDbError::InvalidDate { .. }));

        let err = insert_reading_entry(
            &db,
            &ReadingEntryInput {
                id: Some(31337),
                book_id,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_entries_removed_with_book() {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        let book_id = save_book(&db, &BookInput::new("Beloved")).await.expect("save");
        insert_reading_entry(&db, &ReadingEntryInput { book_id, ..Default::default() })
            .await
            .expect("insert");

        delete_book(&db, book_id).await.expect("delete");
        assert!(get_book_reading_list(&db, book_id).await.expect("list").is_empty());
    }
}
