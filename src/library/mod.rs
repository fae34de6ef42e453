//! Library store: the persisted list of committed books.
//!
//! Entries only land here once the caller commits a finished download; the
//! download controller never writes to the store.
//!
//! # Example
//!
//! ```no_run
//! use bookshelf_core::{Database, Library, StoragePaths};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("library.db")).await?;
//! let library = Library::new(db);
//! let storage = StoragePaths::default_location()?;
//! for book in library.list().await? {
//!     println!("{} {}", book.id, book.title);
//! }
//! # let _ = storage;
//! # Ok(())
//! # }
//! ```

mod book;
mod error;
mod status;

pub use book::{Book, ReadingProgress, format_file_size};
pub use error::{LibraryDbErrorKind, LibraryError};
pub use status::{BookStatus, STATUS_FORMAT_VERSION, StatusCodecError};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::storage::StoragePaths;
use status::clamp_unit;

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, LibraryError>;

/// SQLite-backed collection of books, newest first.
#[derive(Debug, Clone)]
pub struct Library {
    db: Database,
}

impl Library {
    /// Creates a library over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a committed entry.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Duplicate`] if the id is already stored, or
    /// [`LibraryError::Database`] if the insert fails.
    #[instrument(skip(self, book), fields(id = %book.id, title = %book.title))]
    pub async fn add(&self, book: &Book) -> Result<()> {
        let status = book
            .status
            .encode()
            .map_err(|e| LibraryError::decode(e.to_string()))?;
        let file_size = book
            .file_size_bytes
            .map(i64::try_from)
            .transpose()
            .map_err(|_| LibraryError::decode("file size exceeds storable range"))?;

        let result = sqlx::query(
            r"INSERT INTO books (
                id, title, author, description, source_url, local_file_name,
                file_size_bytes, file_extension, status, download_progress,
                created_at, updated_at, last_read_at, current_page, total_pages,
                reading_position, cover_image
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(book.id.to_string())
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.source_url)
        .bind(&book.local_file_name)
        .bind(file_size)
        .bind(&book.file_extension)
        .bind(status)
        .bind(clamp_unit(book.download_progress))
        .bind(timestamp(&book.created_at))
        .bind(timestamp(&book.updated_at))
        .bind(book.last_read_at.as_ref().map(timestamp))
        .bind(book.current_page.map(i64::from))
        .bind(book.total_pages.map(i64::from))
        .bind(book.reading_position.map(clamp_unit))
        .bind(&book.cover_image)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => {
                info!("book added to library");
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(LibraryError::Duplicate(book.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Looks up a book by id.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails or the row
    /// cannot be decoded.
    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;

        row.map(BookRow::into_book).transpose()
    }

    /// Lists all books, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails or a row cannot
    /// be decoded.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Book>> {
        let rows = sqlx::query_as::<_, BookRow>(
            "SELECT * FROM books ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(BookRow::into_book).collect()
    }

    /// Number of books in the library.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM books")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Deletes a book and its stored file. A file that is already gone is fine.
    ///
    /// The row delete runs in a transaction that only commits once the file
    /// is gone, so a failure on either side leaves the record in place.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::NotFound`] for an unknown id,
    /// [`LibraryError::Storage`] if the file exists but cannot be removed,
    /// or [`LibraryError::Database`] if the delete fails.
    #[instrument(skip(self, storage))]
    pub async fn remove(&self, id: Uuid, storage: &StoragePaths) -> Result<Book> {
        let book = self.get(id).await?.ok_or(LibraryError::NotFound(id))?;

        let mut tx = self.db.pool().begin().await?;
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound(id));
        }

        if let Some(file_name) = &book.local_file_name {
            storage.delete_book(file_name)?;
            debug!(file = %file_name, "removed book file");
        }
        tx.commit().await?;

        info!(title = %book.title, "book removed from library");
        Ok(book)
    }

    /// Records reading progress and moves the book to `reading`.
    ///
    /// Only books that are `downloaded` (or already `reading`) can be read.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::NotFound`] for an unknown id,
    /// [`LibraryError::InvalidTransition`] when the book is not on disk yet,
    /// or [`LibraryError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn record_reading_progress(
        &self,
        id: Uuid,
        progress: ReadingProgress,
    ) -> Result<Book> {
        let mut book = self.get(id).await?.ok_or(LibraryError::NotFound(id))?;
        if !matches!(book.status, BookStatus::Downloaded | BookStatus::Reading) {
            return Err(LibraryError::InvalidTransition {
                id,
                from: book.status.as_str(),
                to: BookStatus::Reading.as_str(),
            });
        }

        if progress.current_page.is_some() {
            book.current_page = progress.current_page;
        }
        if progress.total_pages.is_some() {
            book.total_pages = progress.total_pages;
        }
        if let Some(position) = progress.position {
            book.reading_position = Some(clamp_unit(position));
        }
        book.set_status(BookStatus::Reading);
        book.last_read_at = Some(book.updated_at);

        let status = book
            .status
            .encode()
            .map_err(|e| LibraryError::decode(e.to_string()))?;
        sqlx::query(
            r"UPDATE books
              SET status = ?, current_page = ?, total_pages = ?, reading_position = ?,
                  last_read_at = ?, updated_at = ?
              WHERE id = ?",
        )
        .bind(status)
        .bind(book.current_page.map(i64::from))
        .bind(book.total_pages.map(i64::from))
        .bind(book.reading_position)
        .bind(book.last_read_at.as_ref().map(timestamp))
        .bind(timestamp(&book.updated_at))
        .bind(id.to_string())
        .execute(self.db.pool())
        .await?;

        debug!(
            page = ?book.current_page,
            position = ?book.reading_position,
            "reading progress recorded"
        );
        Ok(book)
    }

    /// Stores a cover image for a book.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::NotFound`] for an unknown id, or
    /// [`LibraryError::Database`] if the update fails.
    #[instrument(skip(self, image), fields(bytes = image.len()))]
    pub async fn set_cover(&self, id: Uuid, image: &[u8]) -> Result<()> {
        let result = sqlx::query("UPDATE books SET cover_image = ?, updated_at = ? WHERE id = ?")
            .bind(image)
            .bind(timestamp(&Utc::now()))
            .bind(id.to_string())
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            Err(LibraryError::NotFound(id))
        } else {
            Ok(())
        }
    }

    /// Ids of downloaded or reading books whose backing file is gone.
    ///
    /// Reports only; statuses are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if listing fails.
    #[instrument(skip(self, storage))]
    pub async fn missing_files(&self, storage: &StoragePaths) -> Result<Vec<Uuid>> {
        let missing: Vec<Uuid> = self
            .list()
            .await?
            .into_iter()
            .filter(|book| matches!(book.status, BookStatus::Downloaded | BookStatus::Reading))
            .filter(|book| {
                !book
                    .local_file_name
                    .as_deref()
                    .is_some_and(|name| storage.file_exists(name))
            })
            .map(|book| book.id)
            .collect();

        if !missing.is_empty() {
            warn!(count = missing.len(), "books reference missing files");
        }
        Ok(missing)
    }
}

/// Fixed-width UTC timestamp so text ordering matches time ordering.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LibraryError::decode(format!("invalid {column} '{value}': {e}")))
}

/// Raw `books` row.
#[derive(Debug, FromRow)]
struct BookRow {
    id: String,
    title: String,
    author: Option<String>,
    description: Option<String>,
    source_url: Option<String>,
    local_file_name: Option<String>,
    file_size_bytes: Option<i64>,
    file_extension: Option<String>,
    status: Option<Vec<u8>>,
    download_progress: f64,
    created_at: String,
    updated_at: String,
    last_read_at: Option<String>,
    current_page: Option<i64>,
    total_pages: Option<i64>,
    reading_position: Option<f64>,
    cover_image: Option<Vec<u8>>,
}

impl BookRow {
    fn into_book(self) -> Result<Book> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| LibraryError::decode(format!("invalid id '{}': {e}", self.id)))?;

        // Unreadable status degrades to unknown rather than hiding the book.
        let status = match self.status.as_deref() {
            None => BookStatus::Unknown,
            Some(bytes) => BookStatus::decode(bytes).unwrap_or_else(|e| {
                warn!(%id, error = %e, "stored status unreadable, treating as unknown");
                BookStatus::Unknown
            }),
        };

        Ok(Book {
            id,
            title: self.title,
            author: self.author,
            description: self.description,
            source_url: self.source_url,
            local_file_name: self.local_file_name,
            file_size_bytes: self.file_size_bytes.and_then(|v| u64::try_from(v).ok()),
            file_extension: self.file_extension,
            status,
            download_progress: self.download_progress,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            last_read_at: self
                .last_read_at
                .as_deref()
                .map(|v| parse_timestamp("last_read_at", v))
                .transpose()?,
            current_page: self.current_page.and_then(|v| u32::try_from(v).ok()),
            total_pages: self.total_pages.and_then(|v| u32::try_from(v).ok()),
            reading_position: self.reading_position,
            cover_image: self.cover_image,
        })
    }
}
