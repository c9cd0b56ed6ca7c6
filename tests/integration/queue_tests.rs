//! End-to-end ingestion queue tests
//!
//! The tracker and the snapshot cache run on separate connections to the
//! same SQLite file, the way the binary wires them up.

use pagevault::auth::TenantContext;
use pagevault::blob::FsBlobStore;
use pagevault::config::QueueConfig;
use pagevault::queue::{QueueState, QueueTracker};
use pagevault::snapshot::SnapshotCache;
use pagevault::storage::{open_storage, SqliteStore};
use reqwest::Client;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn open_tracker(dir: &TempDir) -> QueueTracker<SqliteStore> {
    let store = open_storage(&dir.path().join("pagevault.db")).expect("open db");
    QueueTracker::new(store, &QueueConfig::default())
}

fn open_cache(dir: &TempDir) -> SnapshotCache<SqliteStore> {
    let store = open_storage(&dir.path().join("pagevault.db")).expect("open db");
    let blobs = FsBlobStore::new(dir.path().join("blobs")).expect("open blob root");
    SnapshotCache::new(store, Arc::new(blobs), Client::new())
}

fn ctx() -> TenantContext {
    TenantContext::new("acme", "analyst")
}

#[tokio::test]
async fn test_work_loop_drains_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/doc-\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("content"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut tracker = open_tracker(&dir);
    let mut cache = open_cache(&dir);

    let urls: Vec<String> = (0..4)
        .map(|i| format!("{}/doc-{}", server.uri(), i))
        .collect();
    let receipt = tracker.enqueue(&ctx(), &urls, false).unwrap();
    assert_eq!(receipt.enqueued, 4);

    let mut processed = 0;
    while let Some(outcome) = tracker.process_next(&ctx(), &mut cache).await.unwrap() {
        assert!(outcome.succeeded);
        assert_eq!(outcome.item.status, QueueState::Completed);
        processed += 1;
    }
    assert_eq!(processed, 4);

    let report = tracker.status(&ctx(), None).unwrap();
    assert_eq!(report.completed, 4);
    assert_eq!(report.remaining_to_process, 0);
    assert!(report.active_batches.is_empty());

    // The captures went through the shared cache
    let history = cache.list_snapshots(&ctx(), &urls[0], 5).unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_failed_items_retry_until_frozen() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut tracker = open_tracker(&dir);
    let mut cache = open_cache(&dir);

    tracker
        .enqueue(&ctx(), &[format!("{}/flaky", server.uri())], false)
        .unwrap();

    // Attempt, requeue, attempt... until the retry budget is gone
    let mut attempts = 0;
    loop {
        while let Some(outcome) = tracker.process_next(&ctx(), &mut cache).await.unwrap() {
            assert!(!outcome.succeeded);
            attempts += 1;
        }
        if tracker.requeue_retryable(&ctx()).unwrap() == 0 {
            break;
        }
    }
    assert_eq!(attempts, 3);

    let report = tracker.status(&ctx(), None).unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.permanently_failed, 1);
    assert_eq!(report.remaining_to_process, 0);
    assert_eq!(report.failed_sample.len(), 1);
    let dead = &report.failed_sample[0];
    assert_eq!(dead.retry_count, 3);
    assert!(dead.last_error.as_deref().unwrap().contains("503"));
}

#[tokio::test]
async fn test_recovered_origin_completes_on_retry() {
    let server = MockServer::start().await;
    // First attempt fails, the retry succeeds
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(200).set_body_string("back up"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut tracker = open_tracker(&dir);
    let mut cache = open_cache(&dir);

    tracker
        .enqueue(&ctx(), &[format!("{}/recovering", server.uri())], false)
        .unwrap();

    let first = tracker
        .process_next(&ctx(), &mut cache)
        .await
        .unwrap()
        .unwrap();
    assert!(!first.succeeded);
    assert_eq!(first.item.retry_count, 1);

    assert_eq!(tracker.requeue_retryable(&ctx()).unwrap(), 1);
    let second = tracker
        .process_next(&ctx(), &mut cache)
        .await
        .unwrap()
        .unwrap();
    assert!(second.succeeded);

    let report = tracker.status(&ctx(), None).unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn test_tenants_have_isolated_queues() {
    let dir = TempDir::new().unwrap();
    let mut tracker = open_tracker(&dir);

    let acme = TenantContext::new("acme", "analyst");
    let globex = TenantContext::new("globex", "intern");
    tracker
        .enqueue(&acme, &["https://example.com/a".to_string()], false)
        .unwrap();
    tracker
        .enqueue(&globex, &["https://example.com/b".to_string()], false)
        .unwrap();

    assert_eq!(tracker.status(&acme, None).unwrap().pending, 1);
    let claimed = tracker.claim_next(&globex).unwrap().unwrap();
    assert_eq!(claimed.tenant_id, "globex");
    assert!(tracker.claim_next(&globex).unwrap().is_none());
    assert_eq!(tracker.status(&acme, None).unwrap().pending, 1);

    // Clearing one tenant's queue leaves the other untouched
    tracker
        .enqueue(&acme, &["https://example.com/c".to_string()], true)
        .unwrap();
    assert_eq!(tracker.status(&globex, None).unwrap().processing, 1);
}

#[tokio::test]
async fn test_status_scoped_to_batch() {
    let dir = TempDir::new().unwrap();
    let mut tracker = open_tracker(&dir);

    let first = tracker
        .enqueue(
            &ctx(),
            &[
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
            ],
            false,
        )
        .unwrap();
    let second = tracker
        .enqueue(&ctx(), &["https://example.com/c".to_string()], false)
        .unwrap();
    assert_ne!(first.batch_id, second.batch_id);

    let scoped = tracker.status(&ctx(), Some(&first.batch_id)).unwrap();
    assert_eq!(scoped.pending, 2);
    let all = tracker.status(&ctx(), None).unwrap();
    assert_eq!(all.pending, 3);
    assert_eq!(all.active_batches.len(), 2);
}

#[tokio::test]
async fn test_cancel_leaves_processing_items_alone() {
    let dir = TempDir::new().unwrap();
    let mut tracker = open_tracker(&dir);

    tracker
        .enqueue(
            &ctx(),
            &[
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
            ],
            false,
        )
        .unwrap();
    let in_flight = tracker.claim_next(&ctx()).unwrap().unwrap();

    let removed = tracker.cancel(&ctx(), None, false).unwrap();
    assert_eq!(removed, 1);

    // The claimed item is still there and can finish normally
    tracker.mark_completed(in_flight.id).unwrap();
    let report = tracker.status(&ctx(), None).unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.pending, 0);
}
