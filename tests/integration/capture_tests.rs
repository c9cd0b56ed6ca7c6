//! End-to-end capture tests
//!
//! Full stack: wiremock origin, SQLite database file, filesystem blob store.

use pagevault::auth::TenantContext;
use pagevault::blob::{BlobStore, FsBlobStore};
use pagevault::snapshot::{CaptureMethod, CaptureOptions, SnapshotCache};
use pagevault::storage::{open_storage, SqliteStore, Store};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Opens a cache backed by real files under the given temp directory
fn open_test_cache(dir: &TempDir) -> SnapshotCache<SqliteStore> {
    let store = open_storage(&dir.path().join("pagevault.db")).expect("open db");
    let blobs = FsBlobStore::new(dir.path().join("blobs")).expect("open blob root");
    SnapshotCache::new(store, Arc::new(blobs), Client::new())
}

fn ctx() -> TenantContext {
    TenantContext::new("acme", "analyst")
}

#[tokio::test]
async fn test_capture_persists_row_and_blob_on_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>full article</body></html>")
                .insert_header("content-type", "text/html")
                .insert_header("etag", "\"v1\""),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut cache = open_test_cache(&dir);
    let url = format!("{}/article", server.uri());

    let outcome = cache
        .get_or_capture(&ctx(), &url, &CaptureOptions::default())
        .await
        .unwrap();

    assert!(!outcome.was_cached);
    let snapshot = &outcome.snapshot;
    assert_eq!(snapshot.tenant_id, "acme");
    assert_eq!(snapshot.captured_by, "analyst");
    assert_eq!(snapshot.http_status, 200);
    assert_eq!(snapshot.method, CaptureMethod::Http);
    assert_eq!(snapshot.fingerprint.len(), 16);
    assert!(snapshot
        .headers
        .iter()
        .any(|(name, value)| name == "etag" && value == "\"v1\""));

    // The blob landed under the blob root and reads back byte-for-byte
    assert!(dir.path().join("blobs").join(&snapshot.blob_key).exists());
    let content = cache.read_content(snapshot).unwrap();
    assert_eq!(content, b"<html><body>full article</body></html>");
}

#[tokio::test]
async fn test_cache_survives_reopening_the_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("persisted"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/page", server.uri());

    let first = {
        let mut cache = open_test_cache(&dir);
        cache
            .get_or_capture(&ctx(), &url, &CaptureOptions::default())
            .await
            .unwrap()
    };

    // A fresh process sees the same snapshot without refetching
    let mut cache = open_test_cache(&dir);
    let second = cache
        .get_or_capture(&ctx(), &url, &CaptureOptions::default())
        .await
        .unwrap();

    assert!(second.was_cached);
    assert_eq!(second.snapshot.id, first.snapshot.id);
    assert_eq!(cache.read_content(&second.snapshot).unwrap(), b"persisted");
}

#[tokio::test]
async fn test_spelling_variants_hit_one_cache_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("results"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut cache = open_test_cache(&dir);
    let base = server.uri();

    let spellings = [
        format!("{}/search?q=rust&page=2", base),
        format!("{}/search?page=2&q=rust", base),
        format!("{}/search?page=2&q=rust#results", base),
    ];

    let mut ids = Vec::new();
    for spelling in &spellings {
        let outcome = cache
            .get_or_capture(&ctx(), spelling, &CaptureOptions::default())
            .await
            .unwrap();
        ids.push(outcome.snapshot.id);
    }

    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[1], ids[2]);
}

#[tokio::test]
async fn test_force_refresh_keeps_history_and_advances_pointer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("edition"))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut cache = open_test_cache(&dir);
    let url = format!("{}/page", server.uri());

    let mut ids = Vec::new();
    for force in [false, true, true] {
        let outcome = cache
            .get_or_capture(
                &ctx(),
                &url,
                &CaptureOptions {
                    force_refresh: force,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!outcome.was_cached);
        ids.push(outcome.snapshot.id);
    }

    // Every capture is its own immutable row
    let history = cache.list_snapshots(&ctx(), &url, 10).unwrap();
    assert_eq!(history.len(), 3);
    // Most recent first, and the index pointer tracks it
    assert_eq!(history[0].id, ids[2]);
    let entry = cache
        .store()
        .get_page_index("acme", &history[0].fingerprint)
        .unwrap()
        .unwrap();
    assert_eq!(entry.latest_snapshot_id, ids[2]);
    assert_eq!(entry.snapshot_count, 3);
}

#[tokio::test]
async fn test_failed_capture_leaves_no_blob_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut cache = open_test_cache(&dir);
    let url = format!("{}/gone", server.uri());

    let result = cache
        .get_or_capture(&ctx(), &url, &CaptureOptions::default())
        .await;
    assert!(result.is_err());

    assert!(cache.list_snapshots(&ctx(), &url, 10).unwrap().is_empty());
    let blob_root = dir.path().join("blobs");
    let files: Vec<_> = walk_files(&blob_root);
    assert!(files.is_empty(), "unexpected blob files: {:?}", files);
}

#[tokio::test]
async fn test_blob_store_rejects_escaping_handles() {
    let dir = TempDir::new().unwrap();
    let blobs = FsBlobStore::new(dir.path().join("blobs")).unwrap();

    assert!(blobs.get("../outside").is_err());
    assert!(blobs.put("a/../../outside", b"x", "text/plain").is_err());
}

/// Collects every regular file under a directory
fn walk_files(root: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}
