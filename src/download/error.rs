//! Error types for the download module.
//!
//! Every failure of a single fetch attempt is classified into [`DownloadError`].
//! The `Display` text is the human-readable description shown to users; a
//! subset of variants also carries a recovery hint via
//! [`DownloadError::recovery_suggestion`].

use std::path::PathBuf;

use thiserror::Error;

use crate::library::Book;

/// Errors that can occur while turning a URL into a stored book file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The input string was empty.
    #[error("Please enter a URL.")]
    EmptyInput,

    /// The input could not be parsed into a URL with a scheme and host.
    #[error("Invalid URL format: {url}. Please check the URL and try again.")]
    InvalidUrl {
        /// The rejected input.
        url: String,
    },

    /// The server answered, but not with something that can be stored.
    #[error("Invalid server response from {url}: {reason}. Please try again later.")]
    InvalidResponse {
        /// The URL that was fetched.
        url: String,
        /// What was wrong with the response.
        reason: String,
    },

    /// HTTP status outside the 200-299 range.
    #[error("Server error (HTTP {status}) downloading {url}. Please try again later.")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The fetched temp file disappeared before it could be stored.
    #[error("Downloaded file not found at {path}.")]
    FileNotFound {
        /// Where the file was expected.
        path: PathBuf,
    },

    /// Moving the fetched file into the library failed.
    #[error("Failed to save file to library as {path}: {source}")]
    FileMoveFailed {
        /// Destination path.
        path: PathBuf,
        /// Underlying storage failure.
        #[source]
        source: crate::storage::StorageError,
    },

    /// Transport-level failure (DNS, connect, TLS, timeout, broken body stream).
    #[error("Network error downloading {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Writing the staging file failed.
    #[error("Failed to write download to {path}: {source}")]
    Io {
        /// Staging file or directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The download was cancelled before it completed.
    #[error("Download was cancelled.")]
    Cancelled,

    /// Not enough free space on the storage volume for the declared body size.
    #[error("Insufficient storage space: {required} bytes needed, {available} available.")]
    InsufficientStorage {
        /// Bytes the server announced.
        required: u64,
        /// Bytes free on the staging volume.
        available: u64,
    },

    /// The URL points at a file type the library does not handle.
    #[error("Unsupported format: {extension}")]
    UnsupportedFormat {
        /// The lowercased extension.
        extension: String,
    },

    /// The background fetch task stopped without producing a result.
    #[error("Download worker stopped unexpectedly: {message}")]
    Worker {
        /// Join failure description.
        message: String,
    },
}

impl DownloadError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a staging I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(extension: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
        }
    }

    /// Creates a file move error.
    pub fn file_move(path: impl Into<PathBuf>, source: crate::storage::StorageError) -> Self {
        Self::FileMoveFailed {
            path: path.into(),
            source,
        }
    }

    /// Returns a hint for resolving the error, when one exists.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidUrl { .. } => Some("Make sure the URL starts with http:// or https://"),
            Self::Network { .. } => Some("Check your internet connection and try again."),
            Self::UnsupportedFormat { .. } => Some("Try downloading an EPUB, PDF, or TXT file."),
            _ => None,
        }
    }

    /// Returns the HTTP status code for [`DownloadError::HttpStatus`].
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for user-initiated cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A download that failed after its entry was created.
///
/// The entry carries `failed(description)` and is handed back so the caller
/// can show it; it is never committed to the library by the controller.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct FailedDownload {
    /// The failure classification.
    #[source]
    pub error: DownloadError,
    /// The in-progress entry, when one had been created.
    pub entry: Option<Book>,
}

impl FailedDownload {
    /// Wraps an error raised before any entry existed.
    #[must_use]
    pub fn before_entry(error: DownloadError) -> Self {
        Self { error, entry: None }
    }
}

impl From<DownloadError> for FailedDownload {
    fn from(error: DownloadError) -> Self {
        Self::before_entry(error)
    }
}
