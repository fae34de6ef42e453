//! Error types for library store operations.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;

/// Structured classification for database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out or is closed.
    Pool,
    /// Stored row could not be decoded into a book.
    Decode,
    /// Unclassified database failure.
    Other,
}

impl LibraryDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => Self::Pool,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => Self::Decode,
            sqlx::Error::Database(database_error) => {
                let code = database_error.code();
                if matches!(
                    code.as_deref(),
                    Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
                ) {
                    Self::BusyOrLocked
                } else if database_error.is_unique_violation()
                    || database_error.is_check_violation()
                    || code
                        .as_deref()
                        .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
                {
                    Self::ConstraintViolation
                } else {
                    Self::Other
                }
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for LibraryDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::Pool => "pool",
            Self::Decode => "decode",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// Errors that can occur during library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification.
        kind: LibraryDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// No book with this id.
    #[error("book not found: {0}\n  Suggestion: run `bookshelf list` to see book ids")]
    NotFound(Uuid),

    /// A book with this id is already in the library.
    #[error("book already in library: {0}")]
    Duplicate(Uuid),

    /// The requested status change is not allowed from the current status.
    #[error("cannot mark book {id} as {to} while it is {from}")]
    InvalidTransition {
        /// Book id.
        id: Uuid,
        /// Current status label.
        from: &'static str,
        /// Requested status label.
        to: &'static str,
    },

    /// Removing the backing file failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<sqlx::Error> for LibraryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: LibraryDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl LibraryError {
    /// Creates a decode error for a stored row that could not be read.
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::Database {
            kind: LibraryDbErrorKind::Decode,
            message: message.into(),
        }
    }

    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<LibraryDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
