//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.

use crate::queue::QueueState;
use crate::snapshot::CaptureMethod;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult, Store};
use crate::storage::{NewSnapshot, PageIndexEntry, QueueItem, Snapshot};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const SNAPSHOT_COLUMNS: &str = "id, tenant_id, url, fingerprint, captured_at, captured_by, \
     blob_key, byte_size, http_status, content_type, headers, method, render_ms, screenshot_key";

const QUEUE_COLUMNS: &str =
    "id, tenant_id, url, status, batch_id, submitted_by, submitted_at, retry_count, last_error";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database, used by tests
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn map_snapshot(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
        let headers_json: String = row.get(10)?;
        Ok(Snapshot {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            url: row.get(2)?,
            fingerprint: row.get(3)?,
            captured_at: row.get(4)?,
            captured_by: row.get(5)?,
            blob_key: row.get(6)?,
            byte_size: row.get::<_, i64>(7)? as u64,
            http_status: row.get::<_, i64>(8)? as u16,
            content_type: row.get(9)?,
            headers: serde_json::from_str(&headers_json).unwrap_or_default(),
            method: CaptureMethod::from_db_string(&row.get::<_, String>(11)?)
                .unwrap_or(CaptureMethod::Http),
            render_ms: row.get::<_, Option<i64>>(12)?.map(|v| v as u64),
            screenshot_key: row.get(13)?,
        })
    }

    fn map_queue_item(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
        Ok(QueueItem {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            url: row.get(2)?,
            status: QueueState::from_db_string(&row.get::<_, String>(3)?)
                .unwrap_or(QueueState::Failed),
            batch_id: row.get(4)?,
            submitted_by: row.get(5)?,
            submitted_at: row.get(6)?,
            retry_count: row.get(7)?,
            last_error: row.get(8)?,
        })
    }
}

impl Store for SqliteStore {
    // ===== Snapshots =====

    fn insert_snapshot(&mut self, snapshot: &NewSnapshot) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let headers_json = serde_json::to_string(&snapshot.headers)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.conn.execute(
            "INSERT INTO snapshots (tenant_id, url, fingerprint, captured_at, captured_by,
             blob_key, byte_size, http_status, content_type, headers, method, render_ms,
             screenshot_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                snapshot.tenant_id,
                snapshot.url,
                snapshot.fingerprint,
                now,
                snapshot.captured_by,
                snapshot.blob_key,
                snapshot.byte_size as i64,
                snapshot.http_status as i64,
                snapshot.content_type,
                headers_json,
                snapshot.method.to_db_string(),
                snapshot.render_ms.map(|v| v as i64),
                snapshot.screenshot_key,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn get_snapshot(&self, snapshot_id: i64) -> StorageResult<Snapshot> {
        let sql = format!("SELECT {} FROM snapshots WHERE id = ?1", SNAPSHOT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        stmt.query_row(params![snapshot_id], Self::map_snapshot)
            .map_err(|_| StorageError::SnapshotNotFound(snapshot_id))
    }

    fn get_latest_snapshot(
        &self,
        tenant_id: &str,
        fingerprint: &str,
    ) -> StorageResult<Option<Snapshot>> {
        let sql = format!(
            "SELECT {} FROM snapshots
             WHERE id = (SELECT latest_snapshot_id FROM page_index
                         WHERE tenant_id = ?1 AND fingerprint = ?2)",
            SNAPSHOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let snapshot = stmt
            .query_row(params![tenant_id, fingerprint], Self::map_snapshot)
            .optional()?;

        Ok(snapshot)
    }

    fn list_snapshots(
        &self,
        tenant_id: &str,
        fingerprint: &str,
        limit: usize,
    ) -> StorageResult<Vec<Snapshot>> {
        let sql = format!(
            "SELECT {} FROM snapshots
             WHERE tenant_id = ?1 AND fingerprint = ?2
             ORDER BY captured_at DESC, id DESC LIMIT ?3",
            SNAPSHOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt.query_map(
            params![tenant_id, fingerprint, limit as i64],
            Self::map_snapshot,
        )?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?);
        }
        Ok(snapshots)
    }

    fn update_latest_pointer(
        &mut self,
        tenant_id: &str,
        fingerprint: &str,
        snapshot_id: i64,
        captured_at: &str,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO page_index (tenant_id, fingerprint, latest_snapshot_id,
             snapshot_count, last_captured_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(tenant_id, fingerprint) DO UPDATE SET
                 latest_snapshot_id = excluded.latest_snapshot_id,
                 snapshot_count = snapshot_count + 1,
                 last_captured_at = excluded.last_captured_at",
            params![tenant_id, fingerprint, snapshot_id, captured_at],
        )?;
        Ok(())
    }

    fn get_page_index(
        &self,
        tenant_id: &str,
        fingerprint: &str,
    ) -> StorageResult<Option<PageIndexEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT tenant_id, fingerprint, latest_snapshot_id, snapshot_count, last_captured_at
             FROM page_index WHERE tenant_id = ?1 AND fingerprint = ?2",
        )?;

        let entry = stmt
            .query_row(params![tenant_id, fingerprint], |row| {
                Ok(PageIndexEntry {
                    tenant_id: row.get(0)?,
                    fingerprint: row.get(1)?,
                    latest_snapshot_id: row.get(2)?,
                    snapshot_count: row.get::<_, i64>(3)? as u64,
                    last_captured_at: row.get(4)?,
                })
            })
            .optional()?;

        Ok(entry)
    }

    // ===== Queue =====

    fn enqueue_items(
        &mut self,
        tenant_id: &str,
        urls: &[String],
        batch_id: &str,
        submitted_by: &str,
    ) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO queue_items (tenant_id, url, status, batch_id, submitted_by,
                 submitted_at, retry_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            )?;
            for url in urls {
                stmt.execute(params![
                    tenant_id,
                    url,
                    QueueState::Pending.to_db_string(),
                    batch_id,
                    submitted_by,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(urls.len())
    }

    fn clear_queue(&mut self, tenant_id: &str) -> StorageResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM queue_items WHERE tenant_id = ?1",
            params![tenant_id],
        )?;
        Ok(removed)
    }

    fn claim_next_pending(&mut self, tenant_id: &str) -> StorageResult<Option<QueueItem>> {
        // Single conditional transition: two workers racing here cannot
        // claim the same row.
        let sql = format!(
            "UPDATE queue_items SET status = ?1
             WHERE id = (SELECT id FROM queue_items
                         WHERE tenant_id = ?2 AND status = ?3 LIMIT 1)
             RETURNING {}",
            QUEUE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let item = stmt
            .query_row(
                params![
                    QueueState::Processing.to_db_string(),
                    tenant_id,
                    QueueState::Pending.to_db_string()
                ],
                Self::map_queue_item,
            )
            .optional()?;

        Ok(item)
    }

    fn mark_item_completed(&mut self, item_id: i64) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE queue_items SET status = ?1 WHERE id = ?2",
            params![QueueState::Completed.to_db_string(), item_id],
        )?;
        if changed == 0 {
            return Err(StorageError::ItemNotFound(item_id));
        }
        Ok(())
    }

    fn mark_item_failed(&mut self, item_id: i64, error: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE queue_items
             SET status = ?1, retry_count = retry_count + 1, last_error = ?2
             WHERE id = ?3",
            params![QueueState::Failed.to_db_string(), error, item_id],
        )?;
        if changed == 0 {
            return Err(StorageError::ItemNotFound(item_id));
        }
        Ok(())
    }

    fn requeue_retryable(&mut self, tenant_id: &str, max_retries: u32) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE queue_items SET status = ?1
             WHERE tenant_id = ?2 AND status = ?3 AND retry_count < ?4",
            params![
                QueueState::Pending.to_db_string(),
                tenant_id,
                QueueState::Failed.to_db_string(),
                max_retries
            ],
        )?;
        Ok(changed)
    }

    fn get_queue_item(&self, item_id: i64) -> StorageResult<QueueItem> {
        let sql = format!("SELECT {} FROM queue_items WHERE id = ?1", QUEUE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        stmt.query_row(params![item_id], Self::map_queue_item)
            .map_err(|_| StorageError::ItemNotFound(item_id))
    }

    fn count_queue_items(
        &self,
        tenant_id: &str,
        batch_id: Option<&str>,
        state: QueueState,
    ) -> StorageResult<u64> {
        let count: i64 = match batch_id {
            Some(batch) => self.conn.query_row(
                "SELECT COUNT(*) FROM queue_items
                 WHERE tenant_id = ?1 AND batch_id = ?2 AND status = ?3",
                params![tenant_id, batch, state.to_db_string()],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM queue_items WHERE tenant_id = ?1 AND status = ?2",
                params![tenant_id, state.to_db_string()],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }

    fn count_permanently_failed(
        &self,
        tenant_id: &str,
        batch_id: Option<&str>,
        max_retries: u32,
    ) -> StorageResult<u64> {
        let count: i64 = match batch_id {
            Some(batch) => self.conn.query_row(
                "SELECT COUNT(*) FROM queue_items
                 WHERE tenant_id = ?1 AND batch_id = ?2 AND status = ?3 AND retry_count >= ?4",
                params![
                    tenant_id,
                    batch,
                    QueueState::Failed.to_db_string(),
                    max_retries
                ],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM queue_items
                 WHERE tenant_id = ?1 AND status = ?2 AND retry_count >= ?3",
                params![tenant_id, QueueState::Failed.to_db_string(), max_retries],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }

    fn permanently_failed_sample(
        &self,
        tenant_id: &str,
        batch_id: Option<&str>,
        max_retries: u32,
        limit: usize,
    ) -> StorageResult<Vec<QueueItem>> {
        let sql = match batch_id {
            Some(_) => format!(
                "SELECT {} FROM queue_items
                 WHERE tenant_id = ?1 AND batch_id = ?2 AND status = ?3 AND retry_count >= ?4
                 ORDER BY id LIMIT ?5",
                QUEUE_COLUMNS
            ),
            None => format!(
                "SELECT {} FROM queue_items
                 WHERE tenant_id = ?1 AND status = ?2 AND retry_count >= ?3
                 ORDER BY id LIMIT ?4",
                QUEUE_COLUMNS
            ),
        };
        let mut stmt = self.conn.prepare(&sql)?;

        let mut items = Vec::new();
        match batch_id {
            Some(batch) => {
                let rows = stmt.query_map(
                    params![
                        tenant_id,
                        batch,
                        QueueState::Failed.to_db_string(),
                        max_retries,
                        limit as i64
                    ],
                    Self::map_queue_item,
                )?;
                for row in rows {
                    items.push(row?);
                }
            }
            None => {
                let rows = stmt.query_map(
                    params![
                        tenant_id,
                        QueueState::Failed.to_db_string(),
                        max_retries,
                        limit as i64
                    ],
                    Self::map_queue_item,
                )?;
                for row in rows {
                    items.push(row?);
                }
            }
        }
        Ok(items)
    }

    fn active_batch_ids(&self, tenant_id: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT batch_id FROM queue_items
             WHERE tenant_id = ?1 AND status IN (?2, ?3)
             ORDER BY batch_id",
        )?;

        let rows = stmt.query_map(
            params![
                tenant_id,
                QueueState::Pending.to_db_string(),
                QueueState::Processing.to_db_string()
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn cancel_items(
        &mut self,
        tenant_id: &str,
        batch_id: Option<&str>,
        clear_all: bool,
    ) -> StorageResult<usize> {
        let removed = match (batch_id, clear_all) {
            (Some(batch), true) => self.conn.execute(
                "DELETE FROM queue_items WHERE tenant_id = ?1 AND batch_id = ?2",
                params![tenant_id, batch],
            )?,
            (Some(batch), false) => self.conn.execute(
                "DELETE FROM queue_items
                 WHERE tenant_id = ?1 AND batch_id = ?2 AND status = ?3",
                params![tenant_id, batch, QueueState::Pending.to_db_string()],
            )?,
            (None, true) => self.conn.execute(
                "DELETE FROM queue_items WHERE tenant_id = ?1",
                params![tenant_id],
            )?,
            (None, false) => self.conn.execute(
                "DELETE FROM queue_items WHERE tenant_id = ?1 AND status = ?2",
                params![tenant_id, QueueState::Pending.to_db_string()],
            )?,
        };
        Ok(removed)
    }
}
