//! Download lifecycle: classify input, fetch in the background, commit the
//! file into the library directory.
//!
//! The controller owns the map of in-flight downloads. Fetch tasks never
//! touch it; they hand their [`FetchedFile`] back through the join handle
//! and [`DownloadController::finish`] applies the outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::client::{FetchedFile, HttpClient};
use super::error::{DownloadError, FailedDownload};
use crate::classifier::{BookUrlExt, parse_source_url};
use crate::library::{Book, BookStatus};
use crate::storage::StoragePaths;

/// Bookkeeping for one in-flight download.
#[derive(Debug)]
struct ActiveDownload {
    entry: Book,
    cancel: CancellationToken,
    progress: watch::Receiver<f64>,
}

type ActiveEntries = HashMap<Uuid, ActiveDownload>;
type ActiveMap = Arc<Mutex<ActiveEntries>>;

fn lock(active: &Mutex<ActiveEntries>) -> MutexGuard<'_, ActiveEntries> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A download's claim on its active-map entry.
///
/// Dropping a slot that still holds its entry cancels the fetch, so an
/// abandoned handle never lingers in the map.
#[derive(Debug)]
struct ActiveSlot {
    id: Uuid,
    active: ActiveMap,
}

impl ActiveSlot {
    /// Removes the entry, returning whether it was still present.
    fn release(&self) -> bool {
        lock(&self.active).remove(&self.id).is_some()
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        if let Some(abandoned) = lock(&self.active).remove(&self.id) {
            abandoned.cancel.cancel();
            debug!(id = %self.id, "download handle dropped, fetch cancelled");
        }
    }
}

/// Ticket for a started download; pass it to [`DownloadController::finish`].
///
/// Dropping the handle without finishing it cancels the download.
#[derive(Debug)]
pub struct DownloadHandle {
    entry: Book,
    cancel: CancellationToken,
    progress: watch::Receiver<f64>,
    task: JoinHandle<Result<FetchedFile, DownloadError>>,
    slot: ActiveSlot,
}

impl DownloadHandle {
    /// Id of the pending entry.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.entry.id
    }

    /// Snapshot of the pending entry as created.
    #[must_use]
    pub fn entry(&self) -> &Book {
        &self.entry
    }

    /// Receiver for the fetch's progress fraction.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress.clone()
    }

    /// Token that aborts this download when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Turns URLs into stored book files and tracks what is in flight.
#[derive(Debug)]
pub struct DownloadController {
    client: HttpClient,
    storage: StoragePaths,
    active: ActiveMap,
}

impl DownloadController {
    /// Creates a controller storing books under `storage`.
    #[must_use]
    pub fn new(client: HttpClient, storage: StoragePaths) -> Self {
        Self {
            client,
            storage,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Storage layout books are committed into.
    #[must_use]
    pub fn storage(&self) -> &StoragePaths {
        &self.storage
    }

    /// Validates `input`, registers a pending entry and spawns its fetch.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::EmptyInput`] for blank input
    /// - [`DownloadError::InvalidUrl`] when the input is not a URL with a
    ///   scheme and host
    /// - [`DownloadError::UnsupportedFormat`] when the URL names a file type
    ///   outside the supported set
    ///
    /// No entry is created in any of these cases.
    #[instrument(skip(self))]
    pub fn start_download(&self, input: &str) -> Result<DownloadHandle, DownloadError> {
        let url = classify(input)?;

        let mut entry = Book::new(url.guess_book_title());
        let extension = url.file_extension();
        if !extension.is_empty() {
            entry = entry.with_file_extension(extension);
        }
        entry.source_url = Some(url.to_string());
        let file_name = url.file_name();
        entry.local_file_name = (!file_name.is_empty()).then_some(file_name);
        entry.set_status(BookStatus::downloading(0.0));

        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = watch::channel(0.0);

        self.lock_active().insert(
            entry.id,
            ActiveDownload {
                entry: entry.clone(),
                cancel: cancel.clone(),
                progress: progress_rx.clone(),
            },
        );

        let client = self.client.clone();
        let staging = self.storage.staging_dir();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            client.fetch(&url, &staging, &progress_tx, &token).await
        });

        info!(id = %entry.id, title = %entry.title, "download started");
        let slot = ActiveSlot {
            id: entry.id,
            active: Arc::clone(&self.active),
        };
        Ok(DownloadHandle {
            entry,
            cancel,
            progress: progress_rx,
            task,
            slot,
        })
    }

    /// Waits for the fetch behind `handle` and applies its outcome.
    ///
    /// On success the file is moved into the books directory and the entry
    /// comes back `downloaded`. On failure the entry comes back `failed`
    /// inside the error. Either way the id leaves the active map.
    ///
    /// A download cancelled before this call claims its result reports
    /// [`DownloadError::Cancelled`] even if the transfer completed; the
    /// fetched file is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`FailedDownload`] carrying the failed entry and its cause.
    #[instrument(skip(self, handle), fields(id = %handle.entry.id))]
    pub async fn finish(&self, handle: DownloadHandle) -> Result<Book, FailedDownload> {
        let DownloadHandle {
            mut entry,
            cancel,
            task,
            slot,
            ..
        } = handle;

        let outcome = match task.await {
            Ok(result) => result,
            Err(_) if cancel.is_cancelled() => Err(DownloadError::Cancelled),
            Err(join_error) => Err(DownloadError::Worker {
                message: join_error.to_string(),
            }),
        };

        // Claim the entry before committing: a cancel that got here first
        // wins, and any later cancel finds nothing to cancel.
        let claimed = slot.release();
        let outcome = match outcome {
            Ok(fetched) if !claimed || cancel.is_cancelled() => {
                drop(fetched);
                Err(DownloadError::Cancelled)
            }
            other => other,
        };
        let committed = outcome.and_then(|fetched| self.commit(&entry, &fetched));

        match committed {
            Ok((file_name, size)) => {
                entry.local_file_name = Some(file_name);
                entry.file_size_bytes = Some(size);
                entry.set_status(BookStatus::Downloaded);
                info!(file = ?entry.local_file_name, bytes = size, "download complete");
                Ok(entry)
            }
            Err(error) => {
                if error.is_cancelled() {
                    debug!("download cancelled");
                } else {
                    warn!(error = %error, "download failed");
                }
                entry.set_status(BookStatus::failed(error.to_string()));
                Err(FailedDownload {
                    error,
                    entry: Some(entry),
                })
            }
        }
    }

    /// Starts a download and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`FailedDownload`] with no entry for rejected input, or with
    /// the failed entry when the fetch or commit fails.
    pub async fn download(&self, input: &str) -> Result<Book, FailedDownload> {
        let handle = self.start_download(input)?;
        self.finish(handle).await
    }

    /// Cancels an in-flight download and forgets it.
    ///
    /// Returns whether a download with this id was active; unknown or
    /// already-finished ids are a no-op.
    #[instrument(skip(self))]
    pub fn cancel_download(&self, id: Uuid) -> bool {
        match self.lock_active().remove(&id) {
            Some(active) => {
                active.cancel.cancel();
                info!("download cancelled");
                true
            }
            None => false,
        }
    }

    /// Snapshot of in-flight entries with their latest progress applied.
    #[must_use]
    pub fn active_downloads(&self) -> Vec<Book> {
        let active = self.lock_active();
        let mut entries: Vec<Book> = active
            .values()
            .map(|download| {
                let mut entry = download.entry.clone();
                let status = BookStatus::downloading(*download.progress.borrow());
                if let BookStatus::Downloading { progress } = status {
                    entry.download_progress = progress;
                }
                entry.status = status;
                entry
            })
            .collect();
        entries.sort_by_key(|entry| entry.created_at);
        entries
    }

    /// Latest progress for an in-flight download.
    #[must_use]
    pub fn progress(&self, id: Uuid) -> Option<f64> {
        self.lock_active()
            .get(&id)
            .map(|download| *download.progress.borrow())
    }

    /// Number of downloads in flight.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock_active().len()
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveEntries> {
        lock(&self.active)
    }

    /// Moves a fetched file into the books directory, returning its stored
    /// name and size.
    fn commit(&self, entry: &Book, fetched: &FetchedFile) -> Result<(String, u64), DownloadError> {
        if !fetched.path().exists() {
            return Err(DownloadError::FileNotFound {
                path: fetched.path().to_path_buf(),
            });
        }

        let file_name = entry
            .local_file_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| fallback_file_name(entry, fetched));

        let destination = self
            .storage
            .move_into_books(fetched.path(), &file_name)
            .map_err(|e| DownloadError::file_move(self.storage.local_file_path(&file_name), e))?;

        let stored_name = destination
            .file_name()
            .map_or(file_name, |name| name.to_string_lossy().into_owned());
        let size = self.storage.file_size(&stored_name).unwrap_or(fetched.bytes);
        Ok((stored_name, size))
    }
}

/// Rejects blank, malformed and unsupported input before any entry exists.
fn classify(input: &str) -> Result<Url, DownloadError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DownloadError::EmptyInput);
    }

    let url = parse_source_url(trimmed)
        .filter(|url| url.is_valid())
        .ok_or_else(|| DownloadError::invalid_url(trimmed))?;

    let extension = url.file_extension();
    if !extension.is_empty() && !url.is_downloadable_file() {
        return Err(DownloadError::unsupported_format(extension));
    }
    Ok(url)
}

/// `<host>_<timestamp>.<ext>` for URLs without a file name.
fn fallback_file_name(entry: &Book, fetched: &FetchedFile) -> String {
    let host = fetched.final_url.host_str().unwrap_or("download");
    let extension = fetched
        .content_type_extension()
        .or(entry.file_extension.as_deref().filter(|e| !e.is_empty()))
        .unwrap_or("bin");
    format!("{host}_{}.{extension}", Utc::now().timestamp())
}
