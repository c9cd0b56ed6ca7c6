//! URL canonicalization and fingerprinting
//!
//! This module turns arbitrary user-supplied URL strings into a stable
//! canonical form, and derives the fixed-length fingerprint used as the
//! snapshot cache key.

use crate::{UrlError, UrlResult};
use sha2::{Digest, Sha256};
use url::Url;

/// Number of hex characters kept from the digest for a fingerprint
pub const FINGERPRINT_LEN: usize = 16;

/// Canonicalizes a URL string
///
/// # Canonicalization Steps
///
/// 1. Trim whitespace and drop a single trailing `/`
/// 2. Prefix `https://` when no `http://`/`https://` scheme is present
/// 3. Parse the URL; reject if malformed or non-HTTP
/// 4. Lowercase the host (path and query case are preserved)
/// 5. Strip the default port (443 for https, 80 for http)
/// 6. Sort query entries lexicographically by raw key, ties by value
/// 7. Remove the fragment
///
/// The result is idempotent: canonicalizing a canonical URL returns it
/// unchanged. The root path keeps its `/`.
///
/// # Arguments
///
/// * `input` - The URL string to canonicalize
///
/// # Returns
///
/// * `Ok(String)` - The canonical URL string
/// * `Err(UrlError)` - The input cannot be parsed as an HTTP(S) URL
///
/// # Examples
///
/// ```
/// use pagevault::url::canonicalize;
///
/// let url = canonicalize("Example.com:443/a?b=2&a=1/").unwrap();
/// assert_eq!(url, "https://example.com/a?a=1&b=2");
/// ```
pub fn canonicalize(input: &str) -> UrlResult<String> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

    // Scheme prefix check is case-insensitive; the parser lowercases the
    // scheme itself.
    let lower = trimmed.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| UrlError::Parse {
        input: input.to_string(),
        message: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .ok_or(UrlError::MissingHost)?
        .to_lowercase();
    url.set_host(Some(&host)).map_err(|e| UrlError::Parse {
        input: input.to_string(),
        message: e.to_string(),
    })?;

    let default_port = match url.scheme() {
        "https" => 443,
        _ => 80,
    };
    if url.port() == Some(default_port) {
        let _ = url.set_port(None);
    }

    if let Some(query) = url.query() {
        if query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&sort_query(query)));
        }
    }

    url.set_fragment(None);

    let mut canonical = url.to_string();

    // A trailing slash can survive the early strip when the input carried
    // more than one (e.g. "/a//"). Never touch the root path or a query.
    if url.query().is_none() && url.path() != "/" && canonical.ends_with('/') {
        canonical.pop();
    }

    Ok(canonical)
}

/// Sorts raw query entries lexicographically by key, then by value
///
/// Entries are compared and rebuilt in their raw (still percent-encoded)
/// form so that canonicalization never re-encodes what the caller sent.
fn sort_query(query: &str) -> String {
    let mut entries: Vec<&str> = query.split('&').collect();
    entries.sort_by(|a, b| {
        let (ak, av) = a.split_once('=').unwrap_or((a, ""));
        let (bk, bv) = b.split_once('=').unwrap_or((b, ""));
        ak.cmp(bk).then(av.cmp(bv))
    });
    entries.join("&")
}

/// Computes the fingerprint of a canonical URL string
///
/// The fingerprint is the SHA-256 digest of the UTF-8 bytes of the canonical
/// string, hex-encoded and truncated to 16 characters. It is deterministic
/// across processes and platforms; collision risk at this length is accepted
/// as negligible.
///
/// # Arguments
///
/// * `canonical` - A canonical URL string (see [`canonicalize`])
///
/// # Returns
///
/// A 16-character lowercase hex string
pub fn fingerprint(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}

/// Canonicalizes a URL and computes its fingerprint in one step
pub fn canonical_key(input: &str) -> UrlResult<(String, String)> {
    let canonical = canonicalize(input)?;
    let fp = fingerprint(&canonical);
    Ok((canonical, fp))
}

/// Normalizes a URL for queue storage: defaults the scheme to `https://`
/// without full canonicalization, so the stored item still reflects the
/// submitted form.
pub fn ensure_scheme(input: &str) -> String {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_missing_scheme() {
        let result = canonicalize("example.com/page").unwrap();
        assert_eq!(result, "https://example.com/page");
    }

    #[test]
    fn test_preserves_explicit_http() {
        let result = canonicalize("http://example.com/page").unwrap();
        assert_eq!(result, "http://example.com/page");
    }

    #[test]
    fn test_lowercase_host_only() {
        let result = canonicalize("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result, "https://example.com/Page");
    }

    #[test]
    fn test_strip_default_https_port() {
        let result = canonicalize("https://example.com:443/page").unwrap();
        assert_eq!(result, "https://example.com/page");
    }

    #[test]
    fn test_strip_default_http_port() {
        let result = canonicalize("http://example.com:80/page").unwrap();
        assert_eq!(result, "http://example.com/page");
    }

    #[test]
    fn test_keeps_explicit_port() {
        let result = canonicalize("https://example.com:8443/page").unwrap();
        assert_eq!(result, "https://example.com:8443/page");
    }

    #[test]
    fn test_sort_query_params() {
        let result = canonicalize("https://example.com/page?b=2&a=1").unwrap();
        assert_eq!(result, "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_sort_query_ties_broken_by_value() {
        let result = canonicalize("https://example.com/page?a=2&a=1").unwrap();
        assert_eq!(result, "https://example.com/page?a=1&a=2");
    }

    #[test]
    fn test_remove_fragment() {
        let result = canonicalize("https://example.com/page#section").unwrap();
        assert_eq!(result, "https://example.com/page");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = canonicalize("https://example.com/page/").unwrap();
        assert_eq!(result, "https://example.com/page");
    }

    #[test]
    fn test_keep_root_slash() {
        let result = canonicalize("https://example.com/").unwrap();
        assert_eq!(result, "https://example.com/");
    }

    #[test]
    fn test_bare_host_gets_root_slash() {
        let result = canonicalize("https://example.com").unwrap();
        assert_eq!(result, "https://example.com/");
    }

    #[test]
    fn test_idempotence() {
        let inputs = [
            "Example.com",
            "HTTPS://Example.com:443/a?b=2&a=1/",
            "http://example.com/path/?z=9&a=1#frag",
            "https://example.com/",
        ];
        for input in inputs {
            let once = canonicalize(input).unwrap();
            let twice = canonicalize(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_equivalent_forms() {
        let a = canonicalize("HTTPS://Example.com:443/a?b=2&a=1/").unwrap();
        let b = canonicalize("https://example.com/a?a=1&b=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_scheme() {
        let result = canonicalize("ftp://example.com/file");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_unparseable_input() {
        let result = canonicalize("http://");
        assert!(result.is_err());
    }

    #[test]
    fn test_fingerprint_length_and_determinism() {
        let canonical = canonicalize("https://example.com/a?a=1&b=2").unwrap();
        let fp1 = fingerprint(&canonical);
        let fp2 = fingerprint(&canonical);
        assert_eq!(fp1.len(), FINGERPRINT_LEN);
        assert_eq!(fp1, fp2);
        assert!(fp1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_differs_for_different_urls() {
        let a = fingerprint("https://example.com/a");
        let b = fingerprint("https://example.com/b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_canonical_key() {
        let (canonical, fp) = canonical_key("Example.com/page").unwrap();
        assert_eq!(canonical, "https://example.com/page");
        assert_eq!(fp, fingerprint(&canonical));
    }

    #[test]
    fn test_ensure_scheme() {
        assert_eq!(ensure_scheme("example.com/a"), "https://example.com/a");
        assert_eq!(ensure_scheme("http://example.com"), "http://example.com");
        assert_eq!(
            ensure_scheme("https://Example.com/Page"),
            "https://Example.com/Page"
        );
    }
}
