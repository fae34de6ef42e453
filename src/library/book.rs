//! Library entry type.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::status::{BookStatus, clamp_unit};

/// One book in the library: identity, source, local file, status and
/// reading position.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    /// Unique identifier, fixed at creation.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Author, when known.
    pub author: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Origin URL for fetched books.
    pub source_url: Option<String>,
    /// Name of the stored file under the books directory.
    pub local_file_name: Option<String>,
    /// Size of the stored file.
    pub file_size_bytes: Option<u64>,
    /// Lowercase extension without the dot.
    pub file_extension: Option<String>,
    /// Download/reading status.
    pub status: BookStatus,
    /// Download fraction in `[0, 1]`.
    pub download_progress: f64,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
    /// When the entry last changed.
    pub updated_at: DateTime<Utc>,
    /// When reading progress was last recorded.
    pub last_read_at: Option<DateTime<Utc>>,
    /// Current page, if the reader reports pages.
    pub current_page: Option<u32>,
    /// Total pages, if known.
    pub total_pages: Option<u32>,
    /// Fractional reading position in `[0, 1]`.
    pub reading_position: Option<f64>,
    /// Cover image bytes.
    pub cover_image: Option<Vec<u8>>,
}

impl Book {
    /// Creates an entry with a fresh id, `unknown` status and zero progress.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            author: None,
            description: None,
            source_url: None,
            local_file_name: None,
            file_size_bytes: None,
            file_extension: None,
            status: BookStatus::Unknown,
            download_progress: 0.0,
            created_at: now,
            updated_at: now,
            last_read_at: None,
            current_page: None,
            total_pages: None,
            reading_position: None,
            cover_image: None,
        }
    }

    /// Sets the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Sets the file extension (stored lowercase).
    #[must_use]
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into().to_lowercase());
        self
    }

    /// Replaces the status and bumps `updated_at`.
    ///
    /// `Downloading` also mirrors its progress into `download_progress`, and
    /// `Downloaded` pins it to 1.0.
    pub fn set_status(&mut self, status: BookStatus) {
        match &status {
            BookStatus::Downloading { progress } => self.download_progress = clamp_unit(*progress),
            BookStatus::Downloaded => self.download_progress = 1.0,
            _ => {}
        }
        self.status = status;
        self.touch();
    }

    /// Bumps `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Human-readable size of the stored file, e.g. `1.5 MB`.
    #[must_use]
    pub fn formatted_file_size(&self) -> Option<String> {
        self.file_size_bytes.map(format_file_size)
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.title, self.id, self.status)
    }
}

/// Reading position reported by a reader view.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadingProgress {
    /// Current page.
    pub current_page: Option<u32>,
    /// Total pages.
    pub total_pages: Option<u32>,
    /// Fractional position in `[0, 1]`; clamped when stored.
    pub position: Option<f64>,
}

/// Formats a byte count with decimal units (`KB`, `MB`, `GB`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{bytes} bytes");
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
