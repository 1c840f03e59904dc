//! Error types for the book database
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by domain (database, validation, configuration) for
//! better error handling and reporting.
//!
//! ## What does NOT produce an error
//!
//! The tax query engine in [`crate::query::tax`] never surfaces a
//! `BookDbError` for a logically invalid filter (unknown taxonomy, empty term
//! list, unrecognized clause shape). Those degrade to SQL that matches no rows
//! or applies no restriction. Only the surrounding storage calls (loading the
//! term catalog, executing the final query) can fail with a `BookDbError`.

use thiserror::Error;

/// Result type alias using our BookDbError type
pub type Result<T> = std::result::Result<T, BookDbError>;

/// Main error type for the book database
#[derive(Error, Debug)]
pub enum BookDbError {
    // ===== Database Errors =====

    /// Generic database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database record not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    // ===== Validation Errors =====

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Required field is missing
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// Date string could not be parsed
    #[error("Invalid date '{value}' for field {field}")]
    InvalidDate {
        field: String,
        value: String,
    },

    /// Taxonomy slug is not registered
    #[error("Unknown taxonomy: {0}")]
    UnknownTaxonomy(String),

    /// Record with the same unique key already exists
    #[error("Duplicate {entity_type}: {key}")]
    Duplicate {
        entity_type: String,
        key: String,
    },

    // ===== Configuration/State Errors =====

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Application state is invalid for the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // ===== External Library Errors =====

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<std::num::ParseIntError> for BookDbError {
    fn from(err: std::num::ParseIntError) -> Self {
        BookDbError::InvalidInput(format!("Failed to parse integer: {}", err))
    }
}

// Helper methods for creating common errors
impl BookDbError {
    /// Create a RecordNotFound error with a resource name
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        BookDbError::RecordNotFound(resource.into())
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        BookDbError::InvalidInput(message.into())
    }

    /// Create an InvalidDate error
    pub fn invalid_date<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        BookDbError::InvalidDate {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check if error means the requested record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BookDbError::RecordNotFound(_) | BookDbError::SqlxError(sqlx::Error::RowNotFound)
        )
    }

    /// Check if error was caused by caller-supplied data
    ///
    /// Validation errors will not succeed on retry without changing the input.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            BookDbError::InvalidInput(_)
                | BookDbError::MissingRequiredField(_)
                | BookDbError::InvalidDate { .. }
                | BookDbError::UnknownTaxonomy(_)
                | BookDbError::Duplicate { .. }
        )
    }

    /// Check if error came from the storage layer
    pub fn is_database_error(&self) -> bool {
        matches!(
            self,
            BookDbError::DatabaseError(_)
                | BookDbError::MigrationFailed(_)
                | BookDbError::SqlxError(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            BookDbError::RecordNotFound(what) => {
                format!("{} could not be found. It may have been deleted.", what)
            }
            BookDbError::InvalidDate { field, value } => {
                format!("'{}' is not a valid date for {}. Use YYYY-MM-DD.", value, field)
            }
            BookDbError::UnknownTaxonomy(slug) => {
                format!("There is no taxonomy called '{}'.", slug)
            }
            BookDbError::MissingRequiredField(field) => {
                format!("Please fill in the {} field.", field)
            }
            BookDbError::MigrationFailed(_) => {
                "The book database could not be upgraded. Please check the logs.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(BookDbError::not_found("Book 4").is_not_found());
        assert!(BookDbError::SqlxError(sqlx::Error::RowNotFound).is_not_found());
        assert!(BookDbError::invalid_date("pub_date", "soon").is_validation_error());
        assert!(BookDbError::UnknownTaxonomy("mood".into()).is_validation_error());
        assert!(!BookDbError::InvalidState("closed".into()).is_validation_error());
        assert!(BookDbError::MigrationFailed("x".into()).is_database_error());
    }

    #[test]
    fn test_user_message() {
        let err = BookDbError::invalid_date("pub_date", "soon");
        assert_eq!(
            err.user_message(),
            "'soon' is not a valid date for pub_date. Use YYYY-MM-DD."
        );

        let err = BookDbError::invalid_input("bad");
        assert_eq!(err.user_message(), "Invalid input: bad");
    }

    #[test]
    fn test_parse_int_conversion() {
        let err: BookDbError = "abc".parse::<i64>().unwrap_err().into();
        assert!(matches!(err, BookDbError::InvalidInput(_)));
    }
}
