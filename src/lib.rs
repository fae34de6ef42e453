//! Bookshelf Core Library
//!
//! Core of a personal e-book library: fetch books from direct links, keep
//! the files in a local directory, and track each book's download and
//! reading status.
//!
//! # Architecture
//!
//! - [`classifier`] - File name, extension, title and validity from a URL
//! - [`download`] - HTTP fetcher and the download lifecycle controller
//! - [`storage`] - On-disk layout for book files
//! - [`library`] - Book model, status encoding and the `SQLite` store
//! - [`db`] - Database connection and schema management

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classifier;
pub mod db;
pub mod download;
pub mod library;
pub mod storage;
#[cfg(test)]
mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use classifier::{BookUrlExt, is_valid_url, parse_source_url};
pub use db::{Database, DbError};
pub use download::{
    DownloadController, DownloadError, DownloadHandle, FailedDownload, FetchTimeouts, HttpClient,
};
pub use library::{
    Book, BookStatus, Library, LibraryDbErrorKind, LibraryError, ReadingProgress,
    format_file_size,
};
pub use storage::{StorageError, StoragePaths};
