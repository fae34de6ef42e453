//! On-disk layout for book files.
//!
//! All book files live directly under `<base>/books`. Cover images get
//! `<base>/covers`, and in-flight downloads are staged in `<base>/staging` so
//! the final move into `books/` is a rename on the same volume.
//!
//! File operations here are synchronous: they are short metadata operations
//! (rename, unlink, stat) issued from the owning context.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};

const BOOKS_DIR: &str = "books";
const COVERS_DIR: &str = "covers";
const STAGING_DIR: &str = "staging";

/// Application directory name under the platform data dir.
const APP_DIR: &str = "bookshelf";

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// File system error with the path it happened on.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being operated on.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The platform has no per-user data directory.
    #[error("could not determine a data directory for this platform")]
    NoDataDir,
}

impl StorageError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Resolved storage directories rooted at one base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    base: PathBuf,
}

impl StoragePaths {
    /// Creates paths rooted at `base`. Nothing is created on disk.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Uses the platform data directory, e.g. `~/.local/share/bookshelf`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoDataDir`] when the platform reports none.
    pub fn default_location() -> Result<Self, StorageError> {
        dirs::data_dir()
            .map(|dir| Self::new(dir.join(APP_DIR)))
            .ok_or(StorageError::NoDataDir)
    }

    /// Base application-data directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    /// Directory holding book files.
    #[must_use]
    pub fn books_dir(&self) -> PathBuf {
        self.base.join(BOOKS_DIR)
    }

    /// Directory reserved for cover images.
    #[must_use]
    pub fn covers_dir(&self) -> PathBuf {
        self.base.join(COVERS_DIR)
    }

    /// Directory for in-flight download temp files.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.base.join(STAGING_DIR)
    }

    /// Creates the books, covers and staging directories if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if a directory cannot be created.
    pub fn ensure_directories(&self) -> Result<(), StorageError> {
        for dir in [self.books_dir(), self.covers_dir(), self.staging_dir()] {
            fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Full path a stored book file with this name would have.
    #[must_use]
    pub fn local_file_path(&self, file_name: &str) -> PathBuf {
        self.books_dir().join(sanitize_filename(file_name))
    }

    /// Moves `source` into the books directory as `file_name`.
    ///
    /// An existing file with the same name is replaced. Falls back to
    /// copy-and-remove when a rename is not possible (different volume).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directories cannot be created or
    /// the file cannot be moved.
    #[instrument(skip(self), fields(source = %source.display()))]
    pub fn move_into_books(&self, source: &Path, file_name: &str) -> Result<PathBuf, StorageError> {
        self.ensure_directories()?;
        let destination = self.local_file_path(file_name);

        if destination.exists() {
            debug!(path = %destination.display(), "replacing existing book file");
            fs::remove_file(&destination).map_err(|e| StorageError::io(&destination, e))?;
        }

        if let Err(rename_error) = fs::rename(source, &destination) {
            debug!(error = %rename_error, "rename failed, copying instead");
            fs::copy(source, &destination).map_err(|e| StorageError::io(&destination, e))?;
            if let Err(e) = fs::remove_file(source) {
                warn!(path = %source.display(), error = %e, "could not remove moved source file");
            }
        }

        Ok(destination)
    }

    /// Deletes a stored book file. A file that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] for any failure other than "not found".
    #[instrument(skip(self))]
    pub fn delete_book(&self, file_name: &str) -> Result<(), StorageError> {
        let path = self.local_file_path(file_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "book file already absent");
                Ok(())
            }
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// Returns true if a stored book file with this name exists.
    #[must_use]
    pub fn file_exists(&self, file_name: &str) -> bool {
        self.local_file_path(file_name).is_file()
    }

    /// Size in bytes of a stored book file, if it exists.
    #[must_use]
    pub fn file_size(&self, file_name: &str) -> Option<u64> {
        fs::metadata(self.local_file_path(file_name))
            .ok()
            .filter(fs::Metadata::is_file)
            .map(|m| m.len())
    }

    /// Names of all files currently in the books directory, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be read.
    pub fn list_book_files(&self) -> Result<Vec<String>, StorageError> {
        let dir = self.books_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&dir, e))?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Free bytes on the volume holding the base directory.
    ///
    /// Queries the nearest existing ancestor so it works before
    /// [`ensure_directories`](Self::ensure_directories) has run.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the query fails.
    pub fn available_space(&self) -> Result<u64, StorageError> {
        let probe = self
            .base
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or(&self.base);
        fs2::available_space(probe).map_err(|e| StorageError::io(probe, e))
    }
}

/// Sanitizes a file name so it stays inside the books directory.
///
/// Replaces characters invalid on common filesystems (`/ \ : * ? " < > |`)
/// and control characters; names made only of dots become underscores.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }
    if sanitized.chars().all(|c| c == '.') {
        return sanitized.replace('.', "_");
    }
    sanitized
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, StoragePaths) {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path().join("data"));
        (temp, paths)
    }

    #[test]
    fn test_directories_derived_from_base() {
        let paths = StoragePaths::new("/var/lib/bookshelf");
        assert_eq!(paths.books_dir(), PathBuf::from("/var/lib/bookshelf/books"));
        assert_eq!(paths.covers_dir(), PathBuf::from("/var/lib/bookshelf/covers"));
        assert_eq!(
            paths.staging_dir(),
            PathBuf::from("/var/lib/bookshelf/staging")
        );
    }

    #[test]
    fn test_ensure_directories_is_idempotent() {
        let (_temp, paths) = storage();
        paths.ensure_directories().unwrap();
        paths.ensure_directories().unwrap();
        assert!(paths.books_dir().is_dir());
        assert!(paths.covers_dir().is_dir());
        assert!(paths.staging_dir().is_dir());
    }

    #[test]
    fn test_move_into_books_creates_dirs_and_moves() {
        let (temp, paths) = storage();
        let source = temp.path().join("incoming.epub");
        fs::write(&source, b"epub bytes").unwrap();

        let stored = paths.move_into_books(&source, "novel.epub").unwrap();

        assert_eq!(stored, paths.books_dir().join("novel.epub"));
        assert!(!source.exists());
        assert!(paths.file_exists("novel.epub"));
        assert_eq!(paths.file_size("novel.epub"), Some(10));
    }

    #[test]
    fn test_move_into_books_overwrites_existing() {
        let (temp, paths) = storage();
        paths.ensure_directories().unwrap();
        fs::write(paths.books_dir().join("novel.epub"), b"old").unwrap();

        let source = temp.path().join("incoming");
        fs::write(&source, b"new contents").unwrap();
        paths.move_into_books(&source, "novel.epub").unwrap();

        assert_eq!(
            fs::read(paths.books_dir().join("novel.epub")).unwrap(),
            b"new contents"
        );
    }

    #[test]
    fn test_move_into_books_cannot_escape_books_dir() {
        let (temp, paths) = storage();
        let source = temp.path().join("incoming");
        fs::write(&source, b"x").unwrap();

        let stored = paths.move_into_books(&source, "../../evil.txt").unwrap();

        assert_eq!(stored.parent().unwrap(), paths.books_dir());
    }

    #[test]
    fn test_delete_book_ignores_missing_file() {
        let (_temp, paths) = storage();
        paths.delete_book("never-existed.pdf").unwrap();
    }

    #[test]
    fn test_delete_book_removes_file() {
        let (_temp, paths) = storage();
        paths.ensure_directories().unwrap();
        fs::write(paths.books_dir().join("a.txt"), b"text").unwrap();

        paths.delete_book("a.txt").unwrap();

        assert!(!paths.file_exists("a.txt"));
        assert_eq!(paths.file_size("a.txt"), None);
    }

    #[test]
    fn test_list_book_files_sorted_and_empty_when_missing() {
        let (_temp, paths) = storage();
        assert!(paths.list_book_files().unwrap().is_empty());

        paths.ensure_directories().unwrap();
        fs::write(paths.books_dir().join("b.pdf"), b"b").unwrap();
        fs::write(paths.books_dir().join("a.epub"), b"a").unwrap();

        assert_eq!(paths.list_book_files().unwrap(), vec!["a.epub", "b.pdf"]);
    }

    #[test]
    fn test_available_space_before_directories_exist() {
        let (_temp, paths) = storage();
        assert!(paths.available_space().unwrap() > 0);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Book.epub"), "My Book.epub");
        assert_eq!(sanitize_filename("a/b\\c.pdf"), "a_b_c.pdf");
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename(""), "_");
    }
}
