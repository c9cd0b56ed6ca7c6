//! Bounded batch capture
//!
//! This module runs one capture pass over a list of URLs or an expanded
//! sitemap. A single run accepts at most [`MAX_URLS_PER_RUN`] URLs and
//! processes them strictly sequentially in input order; per-URL failures
//! are recorded and do not stop the run.

use crate::auth::TenantContext;
use crate::sitemap::expand_sitemap;
use crate::snapshot::{CaptureOptions, SnapshotCache};
use crate::storage::Store;
use crate::Result;
use reqwest::Client;

/// Maximum URLs processed by a single batch run
pub const MAX_URLS_PER_RUN: usize = 100;

/// What a batch run captures
#[derive(Debug, Clone)]
pub enum BatchInput {
    /// An explicit URL list
    Urls(Vec<String>),
    /// A sitemap URL, expanded before processing
    Sitemap(String),
}

/// Per-URL outcome within a batch run
#[derive(Debug, Clone)]
pub struct BatchItemResult {
    pub url: String,
    pub success: bool,
    /// On success, whether the snapshot came from the cache
    pub was_cached: bool,
    pub error: Option<String>,
}

/// Summary of one batch run
#[derive(Debug, Clone)]
pub struct BatchRun {
    /// URLs the input yielded before the cap
    pub total: usize,
    /// URLs actually processed (capped)
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// True when the input exceeded the per-run cap
    pub has_more: bool,
    /// URLs left unprocessed by the cap
    pub remaining_count: usize,
    /// One entry per processed URL, in input order
    pub results: Vec<BatchItemResult>,
}

/// Captures a batch of URLs through the snapshot cache
///
/// Sitemap input is expanded first; its root fetch error is the only way
/// this function fails once the input is resolved. URLs beyond the cap are
/// reported, never silently dropped.
///
/// # Arguments
///
/// * `cache` - The snapshot cache to capture through
/// * `client` - HTTP client used for sitemap expansion
/// * `ctx` - The tenant running the batch
/// * `input` - URL list or sitemap URL
/// * `options` - Capture options applied to every URL
pub async fn run_batch<S: Store>(
    cache: &mut SnapshotCache<S>,
    client: &Client,
    ctx: &TenantContext,
    input: BatchInput,
    options: &CaptureOptions,
) -> Result<BatchRun> {
    let urls = match input {
        BatchInput::Urls(urls) => urls,
        BatchInput::Sitemap(sitemap_url) => {
            expand_sitemap(client, &sitemap_url).await?.urls
        }
    };

    let total = urls.len();
    let accepted: Vec<String> = urls.into_iter().take(MAX_URLS_PER_RUN).collect();
    let has_more = total > accepted.len();
    let remaining_count = total - accepted.len();

    if has_more {
        tracing::warn!(
            "Batch input has {} urls; processing the first {}",
            total,
            MAX_URLS_PER_RUN
        );
    }

    let mut results = Vec::with_capacity(accepted.len());
    let mut succeeded = 0;
    let mut failed = 0;

    // Sequential on purpose: one origin should never see a burst from us.
    for (index, url) in accepted.iter().enumerate() {
        match cache.get_or_capture(ctx, url, options).await {
            Ok(outcome) => {
                succeeded += 1;
                results.push(BatchItemResult {
                    url: url.clone(),
                    success: true,
                    was_cached: outcome.was_cached,
                    error: None,
                });
            }
            Err(e) => {
                failed += 1;
                tracing::warn!("Batch capture failed for {}: {}", url, e);
                results.push(BatchItemResult {
                    url: url.clone(),
                    success: false,
                    was_cached: false,
                    error: Some(e.to_string()),
                });
            }
        }

        if (index + 1) % 10 == 0 {
            tracing::info!(
                "Batch progress: {}/{} ({} ok, {} failed)",
                index + 1,
                accepted.len(),
                succeeded,
                failed
            );
        }
    }

    Ok(BatchRun {
        total,
        processed: results.len(),
        succeeded,
        failed,
        has_more,
        remaining_count,
        results,
    })
}
