//! PageVault: a content-addressed web page snapshot cache
//!
//! This crate captures remote web pages on behalf of internal tools, reusing
//! recent captures instead of re-fetching, expanding sitemaps into URL lists,
//! and driving bulk URL sets through a bounded batch runner or a retry-bounded
//! persistent queue.

pub mod auth;
pub mod batch;
pub mod blob;
pub mod config;
pub mod fetch;
pub mod queue;
pub mod sitemap;
pub mod snapshot;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for PageVault operations
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Fetch error for {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Invalid URL: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Auth error: {0}")]
    Auth(#[from] auth::AuthError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Returns true if this error came from fetching the remote origin
    /// (unreachable, timed out, or non-2xx), as opposed to a local failure.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::HttpStatus { .. } | Self::Timeout { .. }
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL canonicalization errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL '{input}': {message}")]
    Parse { input: String, message: String },

    #[error("Unsupported URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for PageVault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use auth::TenantContext;
pub use config::Config;
pub use snapshot::{CaptureMethod, CaptureOutcome, SnapshotCache};
pub use storage::Snapshot;
pub use url::{canonicalize, fingerprint};
