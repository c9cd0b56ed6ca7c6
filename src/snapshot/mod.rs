//! Snapshot cache
//!
//! This module implements content-addressed page caching. A URL is reduced
//! to its canonical form and fingerprint, and the latest stored snapshot
//! for (tenant, fingerprint) is reused unless the caller forces a refresh.
//! A capture writes the page body to the blob store first, then the
//! snapshot row, then the latest pointer; a row never references a blob
//! that was not written.

use crate::auth::TenantContext;
use crate::blob::BlobStore;
use crate::fetch::fetch_page;
use crate::storage::{NewSnapshot, Snapshot, Store};
use crate::url::canonical_key;
use crate::Result;
use chrono::Utc;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;

/// How a snapshot's content was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMethod {
    /// Plain HTTP fetch of the page body
    Http,
    /// Fetch through a rendering client that executes scripts
    Rendered,
}

impl CaptureMethod {
    /// Converts the method to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Rendered => "rendered",
        }
    }

    /// Parses a method from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Self::Http),
            "rendered" => Some(Self::Rendered),
            _ => None,
        }
    }
}

impl fmt::Display for CaptureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Per-call capture options
#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// Capture even when a cached snapshot exists
    pub force_refresh: bool,
    /// Method recorded on the resulting snapshot
    pub method: CaptureMethod,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            method: CaptureMethod::Http,
        }
    }
}

/// Result of a `get_or_capture` call
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub snapshot: Snapshot,
    /// True when an existing snapshot was reused without fetching
    pub was_cached: bool,
}

/// Content-addressed page cache over a document store and a blob store
pub struct SnapshotCache<S: Store> {
    store: S,
    blobs: Arc<dyn BlobStore>,
    client: Client,
}

impl<S: Store> SnapshotCache<S> {
    pub fn new(store: S, blobs: Arc<dyn BlobStore>, client: Client) -> Self {
        Self {
            store,
            blobs,
            client,
        }
    }

    /// Returns the cached snapshot for a URL, capturing one if needed
    ///
    /// The URL is canonicalized first, so any spelling of the same page hits
    /// the same cache entry. There is no freshness window: an existing
    /// snapshot is reused until `force_refresh` is set.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The tenant performing the capture
    /// * `url` - URL in any canonicalizable spelling
    /// * `options` - Force-refresh flag and capture method
    ///
    /// # Returns
    ///
    /// * `Ok(CaptureOutcome)` - The snapshot plus whether it was cached
    /// * `Err(VaultError)` - Canonicalization, fetch, or storage failure
    pub async fn get_or_capture(
        &mut self,
        ctx: &TenantContext,
        url: &str,
        options: &CaptureOptions,
    ) -> Result<CaptureOutcome> {
        let (canonical, fingerprint) = canonical_key(url)?;

        if !options.force_refresh {
            if let Some(snapshot) = self
                .store
                .get_latest_snapshot(&ctx.tenant_id, &fingerprint)?
            {
                tracing::debug!("Cache hit for {} ({})", canonical, fingerprint);
                return Ok(CaptureOutcome {
                    snapshot,
                    was_cached: true,
                });
            }
        }

        let page = fetch_page(&self.client, &canonical).await?;
        let content_type = page
            .content_type
            .clone()
            .unwrap_or_else(|| "text/html".to_string());

        // Blob first. A snapshot row must never point at content that was
        // not persisted.
        let key = blob_key(&ctx.tenant_id, &fingerprint);
        let blob_key = self.blobs.put(&key, &page.body, &content_type)?;

        let new_snapshot = NewSnapshot {
            tenant_id: ctx.tenant_id.clone(),
            url: canonical.clone(),
            fingerprint: fingerprint.clone(),
            captured_by: ctx.actor_id.clone(),
            blob_key: blob_key.clone(),
            byte_size: page.body.len() as u64,
            http_status: page.status,
            content_type: page.content_type,
            headers: page.headers,
            method: options.method,
            render_ms: None,
            screenshot_key: None,
        };

        let snapshot_id = match self.store.insert_snapshot(&new_snapshot) {
            Ok(id) => id,
            Err(e) => {
                // The row never existed, so the orphaned blob can go
                if let Err(del) = self.blobs.delete(&blob_key) {
                    tracing::warn!("Failed to delete orphaned blob {}: {}", blob_key, del);
                }
                return Err(e.into());
            }
        };

        let snapshot = self.store.get_snapshot(snapshot_id)?;
        self.store.update_latest_pointer(
            &ctx.tenant_id,
            &fingerprint,
            snapshot_id,
            &snapshot.captured_at,
        )?;

        tracing::info!(
            "Captured {} for tenant {} ({} bytes, HTTP {})",
            canonical,
            ctx.tenant_id,
            snapshot.byte_size,
            snapshot.http_status
        );

        Ok(CaptureOutcome {
            snapshot,
            was_cached: false,
        })
    }

    /// Lists stored snapshots of a URL, most recent first
    pub fn list_snapshots(
        &self,
        ctx: &TenantContext,
        url: &str,
        limit: usize,
    ) -> Result<Vec<Snapshot>> {
        let (_, fingerprint) = canonical_key(url)?;
        Ok(self
            .store
            .list_snapshots(&ctx.tenant_id, &fingerprint, limit)?)
    }

    /// Retrieves the stored content behind a snapshot
    pub fn read_content(&self, snapshot: &Snapshot) -> Result<Vec<u8>> {
        Ok(self.blobs.get(&snapshot.blob_key)?)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Builds a unique blob key for a new capture
fn blob_key(tenant_id: &str, fingerprint: &str) -> String {
    format!(
        "{}/{}/{}.html",
        tenant_id,
        fingerprint,
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
    )
}
