//! Storage module for persisting capture data
//!
//! This module handles all database operations for the snapshot cache and
//! the ingestion queue, including:
//! - SQLite database initialization and schema management
//! - Immutable snapshot rows and the per-page latest pointer
//! - Queue item state transitions and atomic claiming

mod schema;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use sqlite::SqliteStore;
pub use traits::{Store, StorageError, StorageResult};

use crate::queue::QueueState;
use crate::snapshot::CaptureMethod;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_storage(path: &Path) -> Result<SqliteStore, StorageError> {
    SqliteStore::new(path)
}

/// One immutable captured version of a page
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: i64,
    pub tenant_id: String,
    /// Canonical URL the capture was taken for
    pub url: String,
    /// Cache key derived from the canonical URL
    pub fingerprint: String,
    /// RFC 3339 capture timestamp
    pub captured_at: String,
    pub captured_by: String,
    /// Opaque blob-store handle for the page content
    pub blob_key: String,
    pub byte_size: u64,
    pub http_status: u16,
    pub content_type: Option<String>,
    /// Selected response headers recorded at capture time
    pub headers: Vec<(String, String)>,
    pub method: CaptureMethod,
    /// Render duration in milliseconds, for rendered captures
    pub render_ms: Option<u64>,
    pub screenshot_key: Option<String>,
}

/// A snapshot about to be inserted; the store assigns id and timestamp
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub tenant_id: String,
    pub url: String,
    pub fingerprint: String,
    pub captured_by: String,
    pub blob_key: String,
    pub byte_size: u64,
    pub http_status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub method: CaptureMethod,
    pub render_ms: Option<u64>,
    pub screenshot_key: Option<String>,
}

/// Per-(tenant, fingerprint) pointer to the most recent snapshot
#[derive(Debug, Clone)]
pub struct PageIndexEntry {
    pub tenant_id: String,
    pub fingerprint: String,
    pub latest_snapshot_id: i64,
    pub snapshot_count: u64,
    pub last_captured_at: String,
}

/// One URL pending capture within a named batch
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: i64,
    pub tenant_id: String,
    /// The URL as submitted (scheme-defaulted, not canonicalized)
    pub url: String,
    pub status: QueueState,
    pub batch_id: String,
    pub submitted_by: String,
    pub submitted_at: String,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Returns true if this item has exhausted its retry budget
    ///
    /// A permanently failed item is excluded from automatic retry but stays
    /// queryable and cancellable.
    pub fn is_permanently_failed(&self, max_retries: u32) -> bool {
        self.status == QueueState::Failed && self.retry_count >= max_retries
    }
}
