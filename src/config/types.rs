use serde::Deserialize;

/// Main configuration structure for PageVault
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub fetcher: FetcherConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    pub tenant: TenantConfig,
}

/// HTTP fetcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Name of the capturing client, used in the User-Agent header
    #[serde(rename = "client-name")]
    pub client_name: String,

    /// Version of the capturing client
    #[serde(rename = "client-version")]
    pub client_version: String,

    /// URL with information about the capturing client
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Per-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Root directory for captured page content blobs
    #[serde(rename = "blob-root")]
    pub blob_root: String,
}

/// Queue behaviour configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Number of failures after which an item is permanently failed
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

/// Tenant identity used by the CLI
///
/// The core treats identity as an external collaborator; this section backs
/// the static identity provider the command-line binary runs with.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    /// Isolation boundary all snapshots and queue items are scoped to
    #[serde(rename = "tenant-id")]
    pub tenant_id: String,

    /// Actor recorded as the capturing user
    #[serde(rename = "actor-id")]
    pub actor_id: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}
