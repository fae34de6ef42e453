//! End-to-end CLI tests for the bookshelf binary.

mod support;

use assert_cmd::Command;
use bookshelf_core::{Book, BookStatus, Database, Library, StoragePaths};
use predicates::prelude::*;
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

/// Command with an isolated data dir and no user config.
fn bookshelf(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bookshelf").unwrap();
    cmd.env("XDG_CONFIG_HOME", data_dir.path().join("config"))
        .env("HOME", data_dir.path())
        .env_remove("RUST_LOG")
        .env_remove("BOOKSHELF_DATA_DIR")
        .arg("--data-dir")
        .arg(data_dir.path());
    cmd
}

/// Seeds a downloaded book directly through the library API.
fn seed_book(data_dir: &TempDir, title: &str, file: &str) -> Book {
    let storage = StoragePaths::new(data_dir.path());
    storage.ensure_directories().unwrap();
    std::fs::write(storage.local_file_path(file), b"book body").unwrap();

    let mut book = Book::new(title);
    book.local_file_name = Some(file.to_string());
    book.file_size_bytes = Some(9);
    book.set_status(BookStatus::Downloaded);

    tokio_test::block_on(async {
        let db = Database::new(&data_dir.path().join("library.db"))
            .await
            .unwrap();
        Library::new(db.clone()).add(&book).await.unwrap();
        db.close().await;
    });
    book
}

#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("bookshelf").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download e-books"));
}

#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("bookshelf").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bookshelf"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("bookshelf").unwrap();
    cmd.args(["list", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_list_empty_library() {
    let data_dir = TempDir::new().unwrap();
    bookshelf(&data_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Library is empty"));

    assert!(data_dir.path().join("library.db").exists());
    assert!(data_dir.path().join("books").is_dir());
}

#[test]
fn test_list_shows_seeded_book() {
    let data_dir = TempDir::new().unwrap();
    let book = seed_book(&data_dir, "Moby Dick", "moby.txt");

    bookshelf(&data_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Moby Dick"))
        .stdout(predicate::str::contains(book.id.to_string()));
}

#[test]
fn test_fetch_invalid_url_prints_suggestion() {
    let data_dir = TempDir::new().unwrap();
    bookshelf(&data_dir)
        .args(["-q", "fetch", "not-a-valid-url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid URL"))
        .stderr(predicate::str::contains("http://"));
}

#[test]
fn test_fetch_unsupported_format_fails() {
    let data_dir = TempDir::new().unwrap();
    bookshelf(&data_dir)
        .args(["-q", "fetch", "https://example.com/tool.exe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported format: exe"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_then_list() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/The_Hobbit.epub"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"in a hole in the ground"))
        .mount(&mock_server)
        .await;

    let data_dir = TempDir::new().unwrap();
    let url = format!("{}/The_Hobbit.epub", mock_server.uri());

    let fetch = {
        let mut cmd = bookshelf(&data_dir);
        cmd.args(["-q", "fetch", &url]);
        tokio::task::spawn_blocking(move || cmd.assert().success().get_output().clone())
            .await
            .unwrap()
    };
    let stdout = String::from_utf8_lossy(&fetch.stdout);
    assert!(stdout.contains("The Hobbit"), "{stdout}");
    assert!(data_dir.path().join("books").join("The_Hobbit.epub").exists());

    bookshelf(&data_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("The Hobbit"))
        .stdout(predicate::str::contains("Downloaded"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_http_error_exits_non_zero() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let data_dir = TempDir::new().unwrap();
    let url = format!("{}/gone.pdf", mock_server.uri());
    let mut cmd = bookshelf(&data_dir);
    cmd.args(["-q", "fetch", &url]);

    let output = tokio::task::spawn_blocking(move || cmd.assert().failure().get_output().clone())
        .await
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("404"), "{stderr}");
    assert!(!data_dir.path().join("books").join("gone.pdf").exists());
}

#[test]
fn test_read_and_remove() {
    let data_dir = TempDir::new().unwrap();
    let book = seed_book(&data_dir, "Dune", "dune.epub");
    let id = book.id.to_string();

    bookshelf(&data_dir)
        .args(["read", &id, "--page", "10", "--total", "400"])
        .assert()
        .success()
        .stdout(predicate::str::contains("page 10 of 400"));

    bookshelf(&data_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reading"));

    bookshelf(&data_dir)
        .args(["remove", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed \"Dune\""));
    assert!(!data_dir.path().join("books").join("dune.epub").exists());

    bookshelf(&data_dir)
        .args(["remove", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("book not found"));
}

#[test]
fn test_check_reports_missing_files() {
    let data_dir = TempDir::new().unwrap();
    bookshelf(&data_dir)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("All book files are present"));

    let book = seed_book(&data_dir, "Lost", "lost.epub");
    std::fs::remove_file(data_dir.path().join("books").join("lost.epub")).unwrap();

    bookshelf(&data_dir)
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains(book.id.to_string()));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let data_dir = TempDir::new().unwrap();
    let config_dir = data_dir.path().join("config").join("bookshelf");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "connect_timeout_secs = 0\n").unwrap();

    bookshelf(&data_dir)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config"));
}
