//! Fetching books over HTTP and committing them to local storage.
//!
//! [`HttpClient`] performs a single streamed transfer into the staging
//! directory. [`DownloadController`] sits on top: it validates input,
//! builds the pending library entry, runs the fetch on a background task,
//! and moves the result into the books directory.
//!
//! # Example
//!
//! ```no_run
//! use bookshelf_core::StoragePaths;
//! use bookshelf_core::download::{DownloadController, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = DownloadController::new(HttpClient::new(), StoragePaths::default_location()?);
//! let book = controller.download("https://example.com/books/dune.epub").await?;
//! println!("Stored {} as {:?}", book.title, book.local_file_name);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod controller;
mod error;

pub use client::{FetchTimeouts, FetchedFile, HttpClient};
pub use constants::{
    CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS, RESOURCE_TIMEOUT_SECS, SUPPORTED_EXTENSIONS,
    is_supported_extension,
};
pub use controller::{DownloadController, DownloadHandle};
pub use error::{DownloadError, FailedDownload};
