//! HTTP fetching for page captures
//!
//! This module builds the identifying HTTP client and performs the actual
//! page downloads, classifying transport failures and non-2xx responses
//! into the crate's fetch-error variants.

use crate::config::FetcherConfig;
use crate::{Result, VaultError};
use reqwest::Client;
use std::time::Duration;

/// Response headers recorded onto a snapshot
///
/// Everything else the origin sends is dropped; these are the ones the
/// analysis tools downstream actually read.
const SELECTED_HEADERS: &[&str] = &[
    "content-type",
    "content-language",
    "last-modified",
    "etag",
    "cache-control",
    "server",
];

/// A successfully fetched page
#[derive(Debug)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,
    /// HTTP status code
    pub status: u16,
    /// Content-Type header value, if present
    pub content_type: Option<String>,
    /// Selected response headers (see [`SELECTED_HEADERS`])
    pub headers: Vec<(String, String)>,
    /// Raw response body
    pub body: Vec<u8>,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetcher configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FetcherConfig) -> std::result::Result<Client, reqwest::Error> {
    // Format: ClientName/Version (+ContactURL)
    let user_agent = format!(
        "{}/{} (+{})",
        config.client_name, config.client_version, config.contact_url
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page for capture
///
/// Redirects are followed by the client; the final URL is reported on the
/// result. A non-2xx response or a transport failure is an error here —
/// the cache never stores a failed fetch.
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
///
/// # Returns
///
/// * `Ok(FetchedPage)` - The page content and selected headers
/// * `Err(VaultError)` - Timeout, transport failure, or non-2xx status
pub async fn fetch_page(client: &Client, url: &str) -> Result<FetchedPage> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            VaultError::Timeout {
                url: url.to_string(),
            }
        } else {
            VaultError::Http {
                url: url.to_string(),
                source: e,
            }
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(VaultError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let final_url = response.url().to_string();

    let mut headers = Vec::new();
    for name in SELECTED_HEADERS {
        if let Some(value) = response.headers().get(*name) {
            if let Ok(value) = value.to_str() {
                headers.push((name.to_string(), value.to_string()));
            }
        }
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let body = response.bytes().await.map_err(|e| VaultError::Http {
        url: url.to_string(),
        source: e,
    })?;

    Ok(FetchedPage {
        final_url,
        status: status.as_u16(),
        content_type,
        headers,
        body: body.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> FetcherConfig {
        FetcherConfig {
            client_name: "TestVault".to_string(),
            client_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&test_config()).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_success_collects_selected_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html>hi</html>", "text/html")
                    .insert_header("etag", "\"abc\"")
                    .insert_header("x-irrelevant", "dropped"),
            )
            .mount(&server)
            .await;

        let client = build_http_client(&test_config()).unwrap();
        let page = fetch_page(&client, &format!("{}/page", server.uri()))
            .await
            .unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(page.body, b"<html>hi</html>");
        assert_eq!(page.content_type.as_deref(), Some("text/html"));
        assert!(page.headers.iter().any(|(k, _)| k == "etag"));
        assert!(!page.headers.iter().any(|(k, _)| k == "x-irrelevant"));
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_http_client(&test_config()).unwrap();
        let result = fetch_page(&client, &format!("{}/missing", server.uri())).await;

        match result {
            Err(VaultError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected HttpStatus error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let client = build_http_client(&test_config()).unwrap();
        // Port 1 is never listening
        let result = fetch_page(&client, "http://127.0.0.1:1/").await;
        assert!(matches!(result, Err(VaultError::Http { .. })));
    }
}
