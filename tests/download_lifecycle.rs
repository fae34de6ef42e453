//! Integration tests for the download lifecycle.
//!
//! These drive `DownloadController` against a wiremock server and a real
//! data directory, then commit results into a file-backed library.

mod support;

use std::time::Duration;

use bookshelf_core::{
    BookStatus, Database, DownloadController, DownloadError, HttpClient, Library, StoragePaths,
};
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

/// Controller and library sharing one temp data directory.
async fn setup() -> (DownloadController, Library, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = StoragePaths::new(temp_dir.path());
    storage.ensure_directories().expect("Failed to create dirs");
    let db = Database::new(&temp_dir.path().join("library.db"))
        .await
        .expect("Failed to create database");

    (
        DownloadController::new(HttpClient::new(), storage),
        Library::new(db),
        temp_dir,
    )
}

fn staging_files(storage: &StoragePaths) -> usize {
    std::fs::read_dir(storage.staging_dir())
        .map(|entries| entries.count())
        .unwrap_or(0)
}

// ==================== Success ====================

#[tokio::test]
async fn test_download_success_stores_file_and_commits_entry() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let (controller, library, _temp_dir) = setup().await;

    Mock::given(method("GET"))
        .and(path("/book.epub"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/epub+zip")
                .set_body_bytes(b"PK\x03\x04 epub bytes"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/book.epub", mock_server.uri());
    let handle = controller.start_download(&url).expect("start failed");
    let mut progress = handle.progress();
    let book = controller.finish(handle).await.expect("download failed");

    assert_eq!(book.status, BookStatus::Downloaded);
    assert_eq!(book.download_progress, 1.0);
    assert_eq!(book.local_file_name.as_deref(), Some("book.epub"));
    assert_eq!(book.file_extension.as_deref(), Some("epub"));
    assert_eq!(book.file_size_bytes, Some(15));
    assert_eq!(*progress.borrow_and_update(), 1.0);

    let storage = controller.storage();
    assert!(storage.file_exists("book.epub"));
    assert_eq!(staging_files(storage), 0);
    assert!(controller.active_downloads().is_empty());

    library.add(&book).await.expect("commit failed");
    let stored = library.get(book.id).await.unwrap().unwrap();
    assert_eq!(stored, book);
}

#[tokio::test]
async fn test_download_percent_encoded_name_is_decoded() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let (controller, _library, _temp_dir) = setup().await;

    Mock::given(method("GET"))
        .and(path("/My%20Book.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF"))
        .mount(&mock_server)
        .await;

    let url = format!("{}/My%20Book.pdf", mock_server.uri());
    let book = controller.download(&url).await.expect("download failed");

    assert_eq!(book.title, "My Book");
    assert_eq!(book.local_file_name.as_deref(), Some("My Book.pdf"));
    assert!(controller.storage().file_exists("My Book.pdf"));
}

// ==================== Failures ====================

#[tokio::test]
async fn test_download_404_fails_entry_and_writes_nothing() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let (controller, library, _temp_dir) = setup().await;

    Mock::given(method("GET"))
        .and(path("/book.epub"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let url = format!("{}/book.epub", mock_server.uri());
    let failed = controller.download(&url).await.unwrap_err();

    assert!(matches!(
        failed.error,
        DownloadError::HttpStatus { status: 404, .. }
    ));
    let entry = failed.entry.expect("entry should be returned");
    match entry.status {
        BookStatus::Failed { message } => assert!(message.contains("404"), "{message}"),
        other => panic!("Expected failed status, got: {other:?}"),
    }
    assert!(controller.active_downloads().is_empty());
    assert!(controller.storage().list_book_files().unwrap().is_empty());
    assert_eq!(staging_files(controller.storage()), 0);
    assert_eq!(library.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rejected_inputs_fail_fast_without_entry() {
    let (controller, _library, _temp_dir) = setup().await;

    let cases = [
        ("", "empty"),
        ("   ", "blank"),
        ("not-a-valid-url", "invalid"),
        ("https://example.com/installer.exe", "unsupported"),
    ];
    for (input, label) in cases {
        let failed = controller.download(input).await.unwrap_err();
        assert!(failed.entry.is_none(), "{label} input created an entry");
        match (label, &failed.error) {
            ("empty" | "blank", DownloadError::EmptyInput)
            | ("invalid", DownloadError::InvalidUrl { .. }) => {}
            ("unsupported", DownloadError::UnsupportedFormat { extension }) => {
                assert_eq!(extension, "exe");
            }
            (_, other) => panic!("{label}: unexpected error {other:?}"),
        }
    }
    assert!(controller.active_downloads().is_empty());
}

// ==================== Cancellation ====================

#[tokio::test]
async fn test_cancel_mid_flight_leaves_nothing_behind() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let (controller, library, _temp_dir) = setup().await;

    Mock::given(method("GET"))
        .and(path("/big.epub"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 64 * 1024])
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&mock_server)
        .await;

    let url = format!("{}/big.epub", mock_server.uri());
    let handle = controller.start_download(&url).expect("start failed");
    let id = handle.id();
    assert_eq!(controller.active_downloads().len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(controller.cancel_download(id));

    let failed = tokio::time::timeout(Duration::from_secs(5), controller.finish(handle))
        .await
        .expect("cancel should end the fetch promptly")
        .unwrap_err();

    assert!(failed.error.is_cancelled());
    assert!(controller.active_downloads().is_empty());
    assert!(!controller.storage().file_exists("big.epub"));
    assert_eq!(staging_files(controller.storage()), 0);
    assert_eq!(library.count().await.unwrap(), 0);
}

// ==================== Concurrency ====================

#[tokio::test]
async fn test_concurrent_downloads_are_independent() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let (controller, _library, _temp_dir) = setup().await;

    Mock::given(method("GET"))
        .and(path("/one.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"first")
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/two.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let one = controller
        .start_download(&format!("{}/one.txt", mock_server.uri()))
        .unwrap();
    let two = controller
        .start_download(&format!("{}/two.txt", mock_server.uri()))
        .unwrap();
    assert_ne!(one.id(), two.id());
    assert_eq!(controller.active_downloads().len(), 2);

    let (first, second) = tokio::join!(controller.finish(one), controller.finish(two));

    let first = first.expect("first download should succeed");
    assert!(first.status.is_downloaded());
    assert_eq!(second.unwrap_err().error.status_code(), Some(500));
    assert!(controller.active_downloads().is_empty());
    assert_eq!(
        controller.storage().list_book_files().unwrap(),
        vec!["one.txt".to_string()]
    );
}
