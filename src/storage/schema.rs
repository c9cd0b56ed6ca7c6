//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the PageVault database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Immutable captured page versions, most recent last
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL,
    url TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    captured_by TEXT NOT NULL,
    blob_key TEXT NOT NULL,
    byte_size INTEGER NOT NULL,
    http_status INTEGER NOT NULL,
    content_type TEXT,
    headers TEXT NOT NULL DEFAULT '[]',
    method TEXT NOT NULL,
    render_ms INTEGER,
    screenshot_key TEXT
);

CREATE INDEX IF NOT EXISTS idx_snapshots_tenant_fp ON snapshots(tenant_id, fingerprint);

-- Latest-snapshot pointer per (tenant, fingerprint), last writer wins
CREATE TABLE IF NOT EXISTS page_index (
    tenant_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    latest_snapshot_id INTEGER NOT NULL REFERENCES snapshots(id),
    snapshot_count INTEGER NOT NULL DEFAULT 0,
    last_captured_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, fingerprint)
);

-- Bulk-ingestion backlog
CREATE TABLE IF NOT EXISTS queue_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    submitted_by TEXT NOT NULL,
    submitted_at TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_tenant_status ON queue_items(tenant_id, status);
CREATE INDEX IF NOT EXISTS idx_queue_tenant_batch ON queue_items(tenant_id, batch_id);
"#;

/// Initializes the database schema
///
/// Safe to call on every open; all statements are `IF NOT EXISTS`.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
