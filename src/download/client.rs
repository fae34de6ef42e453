//! HTTP fetcher that streams a book into the staging directory.
//!
//! One call to [`HttpClient::fetch`] is one attempt: no retry, no resume.
//! The body lands in a temp file that deletes itself unless the caller
//! moves it into the library.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tempfile::{NamedTempFile, TempPath};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS, RESOURCE_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// Timeouts applied to every fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTimeouts {
    /// Time allowed to establish the connection.
    pub connect: Duration,
    /// Longest the transfer may go without receiving data.
    pub request: Duration,
    /// Ceiling for the whole transfer, headers through last byte.
    pub resource: Duration,
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            resource: Duration::from_secs(RESOURCE_TIMEOUT_SECS),
        }
    }
}

/// A completed transfer sitting in the staging directory.
///
/// Dropping it deletes the file.
#[derive(Debug)]
pub struct FetchedFile {
    /// Staging file; removed on drop unless persisted.
    pub temp_path: TempPath,
    /// Bytes written.
    pub bytes: u64,
    /// Length the server declared, if any.
    pub content_length: Option<u64>,
    /// Raw `Content-Type` header value.
    pub content_type: Option<String>,
    /// URL after redirects.
    pub final_url: Url,
}

impl FetchedFile {
    /// Location of the staged file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.temp_path
    }

    /// Extension implied by the `Content-Type`, without the dot.
    #[must_use]
    pub fn content_type_extension(&self) -> Option<&'static str> {
        self.content_type
            .as_deref()
            .and_then(extension_from_content_type)
    }
}

/// HTTP client for fetching book files.
///
/// Create once and share; reqwest pools connections internally.
///
/// # Example
///
/// ```no_run
/// use bookshelf_core::download::HttpClient;
/// use tokio::sync::watch;
/// use tokio_util::sync::CancellationToken;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let url = url::Url::parse("https://example.com/book.epub")?;
/// let (progress, _rx) = watch::channel(0.0);
/// let fetched = client
///     .fetch(&url, Path::new("./staging"), &progress, &CancellationToken::new())
///     .await?;
/// println!("{} bytes at {}", fetched.bytes, fetched.path().display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeouts: FetchTimeouts,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default timeouts (30s connect, 5min idle,
    /// 10min total).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeouts(FetchTimeouts::default())
    }

    /// Creates a client with explicit timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(timeouts: FetchTimeouts) -> Self {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.request)
            .timeout(timeouts.resource)
            .gzip(true)
            .user_agent(user_agent::default_download_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client, timeouts }
    }

    /// Timeouts this client was built with.
    #[must_use]
    pub fn timeouts(&self) -> FetchTimeouts {
        self.timeouts
    }

    /// Fetches `url` into a temp file under `staging_dir`.
    ///
    /// Publishes `bytes / content_length` on `progress` while streaming when
    /// the length is declared, and 1.0 once the body is complete.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] for schemes other than http/https
    /// - [`DownloadError::HttpStatus`] for a non-2xx response
    /// - [`DownloadError::Network`] for transport failures and timeouts
    /// - [`DownloadError::InsufficientStorage`] when the declared length
    ///   exceeds free space in `staging_dir`
    /// - [`DownloadError::InvalidResponse`] when the body length disagrees
    ///   with `Content-Length`
    /// - [`DownloadError::Cancelled`] when `cancel` fires first
    /// - [`DownloadError::Io`] when the staging file cannot be written
    #[instrument(skip(self, staging_dir, progress, cancel), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &Url,
        staging_dir: &Path,
        progress: &watch::Sender<f64>,
        cancel: &CancellationToken,
    ) -> Result<FetchedFile, DownloadError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url.as_str()));
        }
        debug!("starting fetch");

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::Cancelled),
            sent = self.client.get(url.clone()).send() => {
                sent.map_err(|e| DownloadError::network(url.as_str(), e))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }

        let content_length = response.content_length();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let final_url = response.url().clone();

        tokio::fs::create_dir_all(staging_dir)
            .await
            .map_err(|e| DownloadError::io(staging_dir, e))?;
        if let Some(required) = content_length {
            check_free_space(staging_dir, required)?;
        }

        let (file, temp_path) = NamedTempFile::new_in(staging_dir)
            .map_err(|e| DownloadError::io(staging_dir, e))?
            .into_parts();
        let mut writer = BufWriter::new(tokio::fs::File::from_std(file));
        let mut stream = response.bytes_stream();
        let mut bytes: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(bytes, "fetch cancelled mid-transfer");
                    return Err(DownloadError::Cancelled);
                }
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| DownloadError::network(url.as_str(), e))?;

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(temp_path.to_path_buf(), e))?;
            bytes += chunk.len() as u64;

            if let Some(total) = content_length.filter(|total| *total > 0) {
                progress.send_replace(fraction(bytes, total));
            }
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(temp_path.to_path_buf(), e))?;

        if let Some(expected) = content_length
            && expected != bytes
        {
            warn!(expected, received = bytes, "body length mismatch");
            return Err(DownloadError::invalid_response(
                url.as_str(),
                format!("expected {expected} bytes, received {bytes}"),
            ));
        }

        progress.send_replace(1.0);
        info!(bytes, content_type = ?content_type, "fetch complete");

        Ok(FetchedFile {
            temp_path,
            bytes,
            content_length,
            content_type,
            final_url,
        })
    }
}

fn check_free_space(staging_dir: &Path, required: u64) -> Result<(), DownloadError> {
    match fs2::available_space(staging_dir) {
        Ok(available) if available < required => {
            Err(DownloadError::InsufficientStorage { required, available })
        }
        Ok(_) => Ok(()),
        Err(e) => {
            debug!(error = %e, "free space unknown, continuing");
            Ok(())
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn fraction(done: u64, total: u64) -> f64 {
    (done as f64 / total as f64).min(1.0)
}

/// Maps a `Content-Type` to a book file extension (no dot).
pub(crate) fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "application/epub+zip" => Some("epub"),
        "application/pdf" => Some("pdf"),
        "text/plain" => Some("txt"),
        "application/x-mobipocket-ebook" => Some("mobi"),
        "application/vnd.amazon.ebook" | "application/vnd.amazon.mobi8-ebook" => Some("azw3"),
        "application/x-fictionbook+xml" | "application/x-fictionbook" => Some("fb2"),
        _ => None,
    }
}
