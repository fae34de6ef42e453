//! Command handlers for the `bookshelf` binary.

mod progress_manager;

use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use bookshelf_core::{
    Book, Database, DownloadController, FailedDownload, HttpClient, Library, ReadingProgress,
    StoragePaths,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app_config::RuntimeSettings;
use crate::cli::Command;

/// Runs one subcommand against the library at `settings`.
pub(crate) async fn run(command: Command, settings: &RuntimeSettings) -> Result<()> {
    settings
        .storage
        .ensure_directories()
        .context("Failed to create library directories")?;
    let db = Database::new(&settings.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open library database '{}'",
                settings.database_path.display()
            )
        })?;
    let library = Library::new(db.clone());

    let mut stdout = io::stdout();
    let result = match command {
        Command::Fetch { url } => fetch(&url, &library, settings, &mut stdout).await,
        Command::List => list(&library, &mut stdout).await,
        Command::Remove { id } => remove(id, &library, &settings.storage, &mut stdout).await,
        Command::Read {
            id,
            page,
            total,
            position,
        } => {
            let progress = ReadingProgress {
                current_page: page,
                total_pages: total,
                position,
            };
            read(id, progress, &library, &mut stdout).await
        }
        Command::Check => check(&library, &settings.storage, &mut stdout).await,
    };

    db.close().await;
    result
}

async fn fetch(
    url: &str,
    library: &Library,
    settings: &RuntimeSettings,
    out: &mut impl Write,
) -> Result<()> {
    let controller = DownloadController::new(
        HttpClient::with_timeouts(settings.timeouts),
        settings.storage.clone(),
    );

    let handle = controller
        .start_download(url)
        .map_err(|error| report_failure(&FailedDownload::before_entry(error)))?;
    let id = handle.id();
    let bar = progress_manager::spawn_progress_bar(
        settings.quiet,
        &handle.entry().title,
        handle.progress(),
    );

    let finish = controller.finish(handle);
    tokio::pin!(finish);
    let outcome = tokio::select! {
        result = &mut finish => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl-C");
            }
            controller.cancel_download(id);
            finish.await
        }
    };

    if let Some(bar) = bar {
        let _ = bar.await;
    }

    let book = outcome.map_err(|failed| report_failure(&failed))?;
    library
        .add(&book)
        .await
        .context("Downloaded file was stored but could not be added to the library")?;

    writeln!(
        out,
        "Downloaded \"{}\" ({}) as {}",
        book.title,
        book.formatted_file_size().unwrap_or_else(|| "unknown size".to_string()),
        book.local_file_name.as_deref().unwrap_or("?"),
    )?;
    writeln!(out, "id: {}", book.id)?;
    Ok(())
}

/// Prints the failure description and hint, returning the error to bubble up.
fn report_failure(failed: &FailedDownload) -> anyhow::Error {
    if let Some(hint) = failed.error.recovery_suggestion() {
        eprintln!("{}\n  Suggestion: {hint}", failed.error);
    } else {
        eprintln!("{}", failed.error);
    }
    if let Some(entry) = &failed.entry {
        debug!(id = %entry.id, status = %entry.status, "download entry discarded");
    }
    anyhow::anyhow!("download failed")
}

async fn list(library: &Library, out: &mut impl Write) -> Result<()> {
    let books = library.list().await?;
    if books.is_empty() {
        writeln!(out, "Library is empty. Add a book with `bookshelf fetch <URL>`.")?;
        return Ok(());
    }
    for book in &books {
        writeln!(out, "{}", format_book_row(book))?;
    }
    info!(count = books.len(), "listed library");
    Ok(())
}

async fn remove(
    id: Uuid,
    library: &Library,
    storage: &StoragePaths,
    out: &mut impl Write,
) -> Result<()> {
    let book = library.remove(id, storage).await?;
    writeln!(out, "Removed \"{}\"", book.title)?;
    Ok(())
}

async fn read(
    id: Uuid,
    progress: ReadingProgress,
    library: &Library,
    out: &mut impl Write,
) -> Result<()> {
    let book = library.record_reading_progress(id, progress).await?;
    let position = match (book.current_page, book.total_pages) {
        (Some(page), Some(total)) => format!("page {page} of {total}"),
        (Some(page), None) => format!("page {page}"),
        _ => book
            .reading_position
            .map_or_else(|| "started".to_string(), |p| format!("{:.0}%", p * 100.0)),
    };
    writeln!(out, "Reading \"{}\": {position}", book.title)?;
    Ok(())
}

async fn check(library: &Library, storage: &StoragePaths, out: &mut impl Write) -> Result<()> {
    let missing = library.missing_files(storage).await?;
    if missing.is_empty() {
        writeln!(out, "All book files are present.")?;
        return Ok(());
    }

    for id in &missing {
        let title = library
            .get(*id)
            .await?
            .map_or_else(String::new, |book| book.title);
        writeln!(out, "missing file: {id}  {title}")?;
    }
    bail!("{} book(s) reference files that no longer exist", missing.len())
}

/// One line of `list` output: id, status, size, title.
fn format_book_row(book: &Book) -> String {
    let status = match book.status.display_text() {
        text if text.is_empty() => book.status.as_str().to_string(),
        text => text,
    };
    let size = book.formatted_file_size().unwrap_or_else(|| "-".to_string());
    let author = book
        .author
        .as_deref()
        .map(|a| format!(" by {a}"))
        .unwrap_or_default();
    format!("{}  {status:<16} {size:>10}  {}{author}", book.id, book.title)
}
