//! Sitemap expansion
//!
//! This module fetches sitemap-like documents and flattens them into a
//! deduplicated URL list. Nested sitemaps are followed through an explicit
//! worklist with a depth bound and a per-document fan-out bound, so a
//! malicious or cyclic sitemap tree can never hang the expansion.
//!
//! `<loc>` values are extracted by plain string scanning rather than an XML
//! parser; real-world sitemaps are malformed often enough that tolerating
//! them matters more than validating them.

use crate::fetch::fetch_page;
use crate::Result;
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Maximum sitemap nesting depth that is fetched
pub const MAX_DEPTH: usize = 3;

/// Maximum nested sitemaps queued per document
pub const MAX_NESTED_PER_LEVEL: usize = 5;

/// Why an extracted URL was kept out of the result list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// The URL references another sitemap and was (possibly) recursed into
    NestedSitemap,
    /// The URL was already seen during this expansion
    Duplicate,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NestedSitemap => "nested_sitemap",
            Self::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An extracted URL that was filtered out of the flat result list
#[derive(Debug, Clone)]
pub struct FilteredUrl {
    pub url: String,
    pub reason: FilterReason,
}

/// The flattened result of a sitemap expansion
#[derive(Debug, Default)]
pub struct SitemapExpansion {
    /// Page URLs, deduplicated, in discovery order
    pub urls: Vec<String>,
    /// URLs kept out of `urls`, with the reason
    pub filtered: Vec<FilteredUrl>,
}

/// Expands a sitemap into a flat, deduplicated URL list
///
/// The root document must fetch successfully; a nested sitemap that fails
/// to fetch is logged and simply contributes no URLs.
///
/// # Arguments
///
/// * `client` - The HTTP client to fetch with
/// * `root_url` - URL of the root sitemap document
///
/// # Returns
///
/// * `Ok(SitemapExpansion)` - Flat URL list plus filtered entries
/// * `Err(VaultError)` - The root sitemap could not be retrieved
pub async fn expand_sitemap(client: &Client, root_url: &str) -> Result<SitemapExpansion> {
    let mut expansion = SitemapExpansion::default();
    let mut seen_pages: HashSet<String> = HashSet::new();
    let mut visited_sitemaps: HashSet<String> = HashSet::new();
    let mut worklist: VecDeque<(String, usize)> = VecDeque::new();

    visited_sitemaps.insert(root_url.to_string());
    worklist.push_back((root_url.to_string(), 0));

    while let Some((sitemap_url, depth)) = worklist.pop_front() {
        let page = match fetch_page(client, &sitemap_url).await {
            Ok(page) => page,
            Err(e) if depth == 0 => return Err(e),
            Err(e) => {
                // Best-effort discovery: a broken branch contributes nothing
                tracing::debug!("Skipping nested sitemap {}: {}", sitemap_url, e);
                continue;
            }
        };

        let body = String::from_utf8_lossy(&page.body);
        let mut nested_queued = 0;

        for location in extract_locations(&body) {
            if looks_like_sitemap(&location) {
                expansion.filtered.push(FilteredUrl {
                    url: location.clone(),
                    reason: FilterReason::NestedSitemap,
                });

                if depth + 1 < MAX_DEPTH
                    && nested_queued < MAX_NESTED_PER_LEVEL
                    && visited_sitemaps.insert(location.clone())
                {
                    worklist.push_back((location, depth + 1));
                    nested_queued += 1;
                }
            } else if seen_pages.insert(location.clone()) {
                expansion.urls.push(location);
            } else {
                expansion.filtered.push(FilteredUrl {
                    url: location,
                    reason: FilterReason::Duplicate,
                });
            }
        }
    }

    tracing::info!(
        "Expanded sitemap {}: {} urls, {} filtered",
        root_url,
        expansion.urls.len(),
        expansion.filtered.len()
    );

    Ok(expansion)
}

/// Extracts every `<loc>…</loc>` value from a sitemap document
///
/// Tolerates malformed XML around the location tags; an unclosed final tag
/// ends the scan. CDATA wrappers are unwrapped.
fn extract_locations(document: &str) -> Vec<String> {
    let mut locations = Vec::new();
    let mut rest = document;

    while let Some(start) = rest.find("<loc>") {
        rest = &rest[start + 5..];
        let Some(end) = rest.find("</loc>") else {
            break;
        };

        let raw = rest[..end].trim();
        let value = raw
            .strip_prefix("<![CDATA[")
            .and_then(|v| v.strip_suffix("]]>"))
            .unwrap_or(raw)
            .trim();

        if !value.is_empty() {
            locations.push(value.to_string());
        }
        rest = &rest[end + 6..];
    }

    locations
}

/// Heuristic for whether an extracted URL references another sitemap
fn looks_like_sitemap(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let without_query = lower
        .split_once('?')
        .map(|(base, _)| base)
        .unwrap_or(&lower);

    without_query.ends_with(".xml") || without_query.contains("sitemap")
}
