//! Storage traits and error types
//!
//! This module defines the trait interface for document-store backends and
//! associated error types.

use crate::queue::QueueState;
use crate::storage::{NewSnapshot, PageIndexEntry, QueueItem, Snapshot};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(i64),

    #[error("Queue item not found: {0}")]
    ItemNotFound(i64),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for document-store backends
///
/// This trait defines all persistence operations the snapshot cache and the
/// queue tracker need. Snapshot rows are write-once; queue items are mutated
/// only through the transition methods below, and claiming must be a single
/// conditional state-transition against the store.
pub trait Store {
    // ===== Snapshots =====

    /// Inserts an immutable snapshot row, returning its id
    ///
    /// The store assigns the capture timestamp. The row is never updated
    /// afterwards; newer captures of the same fingerprint supersede it via
    /// the latest pointer.
    fn insert_snapshot(&mut self, snapshot: &NewSnapshot) -> StorageResult<i64>;

    /// Gets a snapshot by id
    fn get_snapshot(&self, snapshot_id: i64) -> StorageResult<Snapshot>;

    /// Gets the latest snapshot for (tenant, fingerprint) via the page index
    fn get_latest_snapshot(
        &self,
        tenant_id: &str,
        fingerprint: &str,
    ) -> StorageResult<Option<Snapshot>>;

    /// Lists snapshots for (tenant, fingerprint), most recent first
    fn list_snapshots(
        &self,
        tenant_id: &str,
        fingerprint: &str,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>>;

    /// Points (tenant, fingerprint) at a new latest snapshot
    ///
    /// A single upsert: creates the index entry on first capture, otherwise
    /// overwrites the pointer (last writer wins) and bumps the count.
    fn update_latest_pointer(
        &mut self,
        tenant_id: &str,
        fingerprint: &str,
        snapshot_id: i64,
        captured_at: &str,
    ) -> StorageResult<()>;

    /// Gets the page-index entry for (tenant, fingerprint)
    fn get_page_index(
        &self,
        tenant_id: &str,
        fingerprint: &str,
    ) -> StorageResult<Option<PageIndexEntry>>;

    // ===== Queue =====

    /// Inserts pending queue items for a batch, returning the count inserted
    fn enqueue_items(
        &mut self,
        tenant_id: &str,
        urls: &[String],
        batch_id: &str,
        submitted_by: &str,
    ) -> StorageResult<usize>;

    /// Deletes every queue item for a tenant, returning the count removed
    fn clear_queue(&mut self, tenant_id: &str) -> StorageResult<usize>;

    /// Atomically claims one pending item, marking it `processing`
    ///
    /// Implemented as a single conditional update so two workers can never
    /// claim the same item. No ordering guarantee among pending items.
    fn claim_next_pending(&mut self, tenant_id: &str) -> StorageResult<Option<QueueItem>>;

    /// Marks a claimed item completed
    fn mark_item_completed(&mut self, item_id: i64) -> StorageResult<()>;

    /// Marks a claimed item failed, recording the error and bumping the
    /// retry count
    fn mark_item_failed(&mut self, item_id: i64, error: &str) -> StorageResult<()>;

    /// Moves failed items with retries left back to pending
    ///
    /// Items at or past `max_retries` are left frozen in `failed`.
    fn requeue_retryable(&mut self, tenant_id: &str, max_retries: u32) -> StorageResult<usize>;

    /// Gets a queue item by id
    fn get_queue_item(&self, item_id: i64) -> StorageResult<QueueItem>;

    /// Counts items in a state, optionally scoped to one batch
    fn count_queue_items(
        &self,
        tenant_id: &str,
        batch_id: Option<&str>,
        state: QueueState,
    ) -> StorageResult<u64>;

    /// Counts failed items that have exhausted their retry budget
    fn count_permanently_failed(
        &self,
        tenant_id: &str,
        batch_id: Option<&str>,
        max_retries: u32,
    ) -> StorageResult<u64>;

    /// Samples permanently failed items with their last errors
    fn permanently_failed_sample(
        &self,
        tenant_id: &str,
        batch_id: Option<&str>,
        max_retries: u32,
        limit: usize,
    ) -> StorageResult<Vec<QueueItem>>;

    /// Lists batch ids that still have pending or processing items
    fn active_batch_ids(&self, tenant_id: &str) -> StorageResult<Vec<String>>;

    /// Deletes queue items, returning the count removed
    ///
    /// By default only `pending` items go; `clear_all` removes every status.
    /// In-flight items are never interrupted, only un-accepted work is
    /// dropped.
    fn cancel_items(
        &mut self,
        tenant_id: &str,
        batch_id: Option<&str>,
        clear_all: bool,
    ) -> StorageResult<usize>;
}
