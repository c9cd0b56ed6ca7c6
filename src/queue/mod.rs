//! Ingestion queue tracking
//!
//! This module tracks URLs submitted for capture as durable queue items.
//! Each item moves through a small state machine:
//!
//! ```text
//! pending -> processing -> completed
//!                       -> failed -> pending   (while retries remain)
//! ```
//!
//! A failed item whose retry count has reached the configured maximum is
//! *permanently failed*: it is never requeued automatically, but it stays
//! in the store for inspection and cancellation.

use crate::auth::TenantContext;
use crate::config::QueueConfig;
use crate::snapshot::{CaptureOptions, SnapshotCache};
use crate::storage::{QueueItem, Store};
use crate::url::ensure_scheme;
use crate::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// How many permanently failed items a status report includes verbatim
const FAILED_SAMPLE_LIMIT: usize = 5;

static BATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Processing state of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Waiting to be claimed by a worker
    Pending,
    /// Claimed by a worker, capture in flight
    Processing,
    /// Captured successfully
    Completed,
    /// Last attempt failed; retried while the retry budget lasts
    Failed,
}

impl QueueState {
    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if no worker will touch this item again without a
    /// retry transition
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Result of an `enqueue` call
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    /// Generated id shared by every item of this submission
    pub batch_id: String,
    /// Number of items inserted
    pub enqueued: usize,
    /// Number of prior items removed when `clear_existing` was set
    pub cleared: usize,
}

/// Point-in-time view of a tenant's queue
#[derive(Debug, Clone)]
pub struct QueueReport {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Failed items that have exhausted their retry budget
    pub permanently_failed: u64,
    /// Items a worker can still pick up: pending plus retryable failures
    pub remaining_to_process: u64,
    /// A few permanently failed items with their last errors
    pub failed_sample: Vec<QueueItem>,
    /// Batch ids that still have pending or processing items
    pub active_batches: Vec<String>,
}

/// Outcome of one worker step
#[derive(Debug, Clone)]
pub struct WorkOutcome {
    /// The item after its terminal transition for this attempt
    pub item: QueueItem,
    pub succeeded: bool,
}

/// Tracks queued capture work for tenants
pub struct QueueTracker<S: Store> {
    store: S,
    max_retries: u32,
}

impl<S: Store> QueueTracker<S> {
    pub fn new(store: S, config: &QueueConfig) -> Self {
        Self {
            store,
            max_retries: config.max_retries,
        }
    }

    /// Submits URLs as pending queue items under a fresh batch id
    ///
    /// URLs are stored with a defaulted scheme but otherwise as submitted;
    /// canonicalization happens at capture time. With `clear_existing`, every
    /// prior item for the tenant is removed first, whatever its state.
    pub fn enqueue(
        &mut self,
        ctx: &TenantContext,
        urls: &[String],
        clear_existing: bool,
    ) -> Result<EnqueueOutcome> {
        let cleared = if clear_existing {
            self.store.clear_queue(&ctx.tenant_id)?
        } else {
            0
        };

        let batch_id = generate_batch_id(&ctx.tenant_id);
        let prepared: Vec<String> = urls.iter().map(|u| ensure_scheme(u)).collect();
        let enqueued =
            self.store
                .enqueue_items(&ctx.tenant_id, &prepared, &batch_id, &ctx.actor_id)?;

        tracing::info!(
            "Enqueued {} urls as batch {} for tenant {} ({} cleared)",
            enqueued,
            batch_id,
            ctx.tenant_id,
            cleared
        );

        Ok(EnqueueOutcome {
            batch_id,
            enqueued,
            cleared,
        })
    }

    /// Atomically claims one pending item for processing
    pub fn claim_next(&mut self, ctx: &TenantContext) -> Result<Option<QueueItem>> {
        Ok(self.store.claim_next_pending(&ctx.tenant_id)?)
    }

    /// Marks a claimed item completed
    pub fn mark_completed(&mut self, item_id: i64) -> Result<()> {
        Ok(self.store.mark_item_completed(item_id)?)
    }

    /// Marks a claimed item failed, recording the error
    pub fn mark_failed(&mut self, item_id: i64, error: &str) -> Result<()> {
        Ok(self.store.mark_item_failed(item_id, error)?)
    }

    /// Moves retryable failed items back to pending
    pub fn requeue_retryable(&mut self, ctx: &TenantContext) -> Result<usize> {
        let moved = self
            .store
            .requeue_retryable(&ctx.tenant_id, self.max_retries)?;
        if moved > 0 {
            tracing::info!(
                "Requeued {} failed items for tenant {}",
                moved,
                ctx.tenant_id
            );
        }
        Ok(moved)
    }

    /// Reports queue counts for a tenant, optionally scoped to one batch
    pub fn status(&self, ctx: &TenantContext, batch_id: Option<&str>) -> Result<QueueReport> {
        let tenant = ctx.tenant_id.as_str();
        let pending = self
            .store
            .count_queue_items(tenant, batch_id, QueueState::Pending)?;
        let processing = self
            .store
            .count_queue_items(tenant, batch_id, QueueState::Processing)?;
        let completed = self
            .store
            .count_queue_items(tenant, batch_id, QueueState::Completed)?;
        let failed = self
            .store
            .count_queue_items(tenant, batch_id, QueueState::Failed)?;
        let permanently_failed =
            self.store
                .count_permanently_failed(tenant, batch_id, self.max_retries)?;
        let failed_sample = self.store.permanently_failed_sample(
            tenant,
            batch_id,
            self.max_retries,
            FAILED_SAMPLE_LIMIT,
        )?;
        let active_batches = self.store.active_batch_ids(tenant)?;

        Ok(QueueReport {
            pending,
            processing,
            completed,
            failed,
            permanently_failed,
            remaining_to_process: pending + (failed - permanently_failed),
            failed_sample,
            active_batches,
        })
    }

    /// Removes queue items, returning the count removed
    ///
    /// Only pending items are removed unless `clear_all` is set. A
    /// `processing` item is never interrupted; at worst its result lands
    /// after the cancellation.
    pub fn cancel(
        &mut self,
        ctx: &TenantContext,
        batch_id: Option<&str>,
        clear_all: bool,
    ) -> Result<usize> {
        let removed = self.store.cancel_items(&ctx.tenant_id, batch_id, clear_all)?;
        tracing::info!(
            "Cancelled {} items for tenant {} (batch: {}, clear_all: {})",
            removed,
            ctx.tenant_id,
            batch_id.unwrap_or("all"),
            clear_all
        );
        Ok(removed)
    }

    /// Claims and processes one item through the snapshot cache
    ///
    /// Returns `Ok(None)` when no pending item exists. A capture failure
    /// marks the item failed and is not surfaced as an error; the item's
    /// retry budget governs what happens next.
    pub async fn process_next<C: Store>(
        &mut self,
        ctx: &TenantContext,
        cache: &mut SnapshotCache<C>,
    ) -> Result<Option<WorkOutcome>> {
        let Some(item) = self.claim_next(ctx)? else {
            return Ok(None);
        };

        let succeeded = match cache
            .get_or_capture(ctx, &item.url, &CaptureOptions::default())
            .await
        {
            Ok(outcome) => {
                self.mark_completed(item.id)?;
                tracing::debug!(
                    "Queue item {} captured {} (cached: {})",
                    item.id,
                    item.url,
                    outcome.was_cached
                );
                true
            }
            Err(e) => {
                if e.is_fetch_error() {
                    tracing::warn!("Queue item {} failed for {}: {}", item.id, item.url, e);
                } else {
                    tracing::error!("Queue item {} failed for {}: {}", item.id, item.url, e);
                }
                self.mark_failed(item.id, &e.to_string())?;
                false
            }
        };

        let item = self.store.get_queue_item(item.id)?;
        Ok(Some(WorkOutcome { item, succeeded }))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Generates a batch id unique across tenants and submissions
fn generate_batch_id(tenant_id: &str) -> String {
    let counter = BATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    let seed = format!(
        "{}:{}:{}",
        tenant_id,
        Utc::now().timestamp_micros(),
        counter
    );
    let digest = Sha256::digest(seed.as_bytes());
    format!("b-{}", &hex::encode(digest)[..16])
}
