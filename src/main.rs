//! PageVault main entry point
//!
//! This is the command-line interface for the PageVault snapshot cache.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pagevault::auth::{Identity, StaticIdentity};
use pagevault::batch::{run_batch, BatchInput};
use pagevault::blob::FsBlobStore;
use pagevault::config::{load_config_with_hash, Config};
use pagevault::fetch::build_http_client;
use pagevault::queue::QueueTracker;
use pagevault::sitemap::expand_sitemap;
use pagevault::snapshot::{CaptureMethod, CaptureOptions, SnapshotCache};
use pagevault::storage::{open_storage, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// PageVault: a content-addressed web page snapshot cache
///
/// PageVault captures web pages into immutable, tenant-scoped snapshots
/// keyed by a canonical URL fingerprint, and tracks larger ingestion jobs
/// through a durable retry-bounded queue.
#[derive(Parser, Debug)]
#[command(name = "pagevault")]
#[command(version = "0.1.0")]
#[command(about = "A content-addressed web page snapshot cache", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "pagevault.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a single URL, or return its cached snapshot
    Capture {
        url: String,

        /// Capture even when a cached snapshot exists
        #[arg(long)]
        force: bool,

        /// Record the capture as rendered rather than a plain fetch
        #[arg(long)]
        rendered: bool,
    },

    /// Expand a sitemap into a flat URL list without capturing
    Expand {
        /// URL of the root sitemap document
        url: String,
    },

    /// Capture a batch of URLs or a whole sitemap
    Batch {
        /// URLs to capture
        #[arg(required_unless_present = "sitemap")]
        urls: Vec<String>,

        /// Expand this sitemap instead of taking explicit URLs
        #[arg(long, conflicts_with = "urls")]
        sitemap: Option<String>,

        /// Capture even when cached snapshots exist
        #[arg(long)]
        force: bool,
    },

    /// Submit URLs to the durable ingestion queue
    Enqueue {
        urls: Vec<String>,

        /// Remove all of the tenant's existing queue items first
        #[arg(long)]
        clear_existing: bool,
    },

    /// Show queue counts and permanently failed items
    Status {
        /// Restrict the report to one batch
        #[arg(long)]
        batch: Option<String>,
    },

    /// Remove queued items
    Cancel {
        /// Restrict removal to one batch
        #[arg(long)]
        batch: Option<String>,

        /// Remove items in every state, not just pending ones
        #[arg(long)]
        all: bool,
    },

    /// Process queued items until the queue is drained
    Work {
        /// Move retryable failed items back to pending first
        #[arg(long)]
        requeue: bool,

        /// Stop after this many items
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List stored snapshots of a URL, most recent first
    History {
        url: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let ctx = StaticIdentity::new(&config.tenant).current()?;
    let client = build_http_client(&config.fetcher)?;

    match cli.command {
        Command::Capture {
            url,
            force,
            rendered,
        } => {
            let mut cache = open_cache(&config)?;
            let options = CaptureOptions {
                force_refresh: force,
                method: if rendered {
                    CaptureMethod::Rendered
                } else {
                    CaptureMethod::Http
                },
            };
            let outcome = cache.get_or_capture(&ctx, &url, &options).await?;
            let s = &outcome.snapshot;
            println!(
                "{} snapshot {} of {}",
                if outcome.was_cached {
                    "Reused"
                } else {
                    "Captured"
                },
                s.id,
                s.url
            );
            println!("  Fingerprint: {}", s.fingerprint);
            println!("  Captured at: {} by {}", s.captured_at, s.captured_by);
            println!("  HTTP {}, {} bytes, method {}", s.http_status, s.byte_size, s.method);
            println!("  Blob: {}", s.blob_key);
        }

        Command::Expand { url } => {
            let expansion = expand_sitemap(&client, &url).await?;
            for page_url in &expansion.urls {
                println!("{}", page_url);
            }
            eprintln!(
                "{} urls, {} filtered",
                expansion.urls.len(),
                expansion.filtered.len()
            );
            for filtered in &expansion.filtered {
                eprintln!("  [{}] {}", filtered.reason, filtered.url);
            }
        }

        Command::Batch {
            urls,
            sitemap,
            force,
        } => {
            let input = match sitemap {
                Some(sitemap_url) => BatchInput::Sitemap(sitemap_url),
                None => BatchInput::Urls(urls),
            };
            let options = CaptureOptions {
                force_refresh: force,
                ..Default::default()
            };
            let mut cache = open_cache(&config)?;
            let run = run_batch(&mut cache, &client, &ctx, input, &options).await?;

            println!(
                "Processed {}/{} urls: {} ok, {} failed",
                run.processed, run.total, run.succeeded, run.failed
            );
            if run.has_more {
                println!(
                    "{} urls beyond the per-run cap were not processed",
                    run.remaining_count
                );
            }
            for result in run.results.iter().filter(|r| !r.success) {
                println!(
                    "  FAILED {}: {}",
                    result.url,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Command::Enqueue {
            urls,
            clear_existing,
        } => {
            let mut tracker = open_tracker(&config)?;
            let outcome = tracker.enqueue(&ctx, &urls, clear_existing)?;
            println!(
                "Enqueued {} urls as batch {}",
                outcome.enqueued, outcome.batch_id
            );
            if outcome.cleared > 0 {
                println!("Cleared {} prior items", outcome.cleared);
            }
        }

        Command::Status { batch } => {
            let tracker = open_tracker(&config)?;
            let report = tracker.status(&ctx, batch.as_deref())?;
            println!("Queue status for tenant {}:", ctx.tenant_id);
            println!("  Pending:    {}", report.pending);
            println!("  Processing: {}", report.processing);
            println!("  Completed:  {}", report.completed);
            println!(
                "  Failed:     {} ({} permanently)",
                report.failed, report.permanently_failed
            );
            println!("  Remaining:  {}", report.remaining_to_process);
            if !report.active_batches.is_empty() {
                println!("  Active batches: {}", report.active_batches.join(", "));
            }
            for item in &report.failed_sample {
                println!(
                    "  DEAD {} after {} tries: {}",
                    item.url,
                    item.retry_count,
                    item.last_error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Command::Cancel { batch, all } => {
            let mut tracker = open_tracker(&config)?;
            let removed = tracker.cancel(&ctx, batch.as_deref(), all)?;
            println!("Removed {} queue items", removed);
        }

        Command::Work { requeue, limit } => {
            let mut tracker = open_tracker(&config)?;
            let mut cache = open_cache(&config)?;

            if requeue {
                let moved = tracker.requeue_retryable(&ctx)?;
                println!("Requeued {} failed items", moved);
            }

            let mut processed = 0usize;
            let mut succeeded = 0usize;
            while limit.map_or(true, |l| processed < l) {
                let Some(outcome) = tracker.process_next(&ctx, &mut cache).await? else {
                    break;
                };
                processed += 1;
                if outcome.succeeded {
                    succeeded += 1;
                } else {
                    println!(
                        "  FAILED {} (attempt {}): {}",
                        outcome.item.url,
                        outcome.item.retry_count,
                        outcome.item.last_error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            println!(
                "Processed {} items: {} ok, {} failed",
                processed,
                succeeded,
                processed - succeeded
            );
        }

        Command::History { url, limit } => {
            let cache = open_cache(&config)?;
            let snapshots = cache.list_snapshots(&ctx, &url, limit)?;
            if snapshots.is_empty() {
                println!("No snapshots stored for {}", url);
            }
            for s in snapshots {
                println!(
                    "{}  {}  HTTP {}  {} bytes  by {}",
                    s.captured_at, s.id, s.http_status, s.byte_size, s.captured_by
                );
            }
        }
    }

    Ok(())
}

/// Opens the snapshot cache over the configured stores
fn open_cache(config: &Config) -> anyhow::Result<SnapshotCache<SqliteStore>> {
    let store = open_storage(Path::new(&config.storage.database_path))?;
    let blobs = FsBlobStore::new(&config.storage.blob_root)?;
    let client = build_http_client(&config.fetcher)?;
    Ok(SnapshotCache::new(store, Arc::new(blobs), client))
}

/// Opens a queue tracker on its own store connection
fn open_tracker(config: &Config) -> anyhow::Result<QueueTracker<SqliteStore>> {
    let store = open_storage(Path::new(&config.storage.database_path))?;
    Ok(QueueTracker::new(store, &config.queue))
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pagevault=info,warn"),
            1 => EnvFilter::new("pagevault=debug,info"),
            2 => EnvFilter::new("pagevault=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
