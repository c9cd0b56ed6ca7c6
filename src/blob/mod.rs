//! Blob store boundary
//!
//! Captured page bytes are held by an external object store; this module
//! defines that interface plus a filesystem backend for the CLI and an
//! in-memory backend for tests. Blob failures surface as [`StorageError`]
//! so callers see one storage taxonomy.

use crate::storage::{StorageError, StorageResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Trait for blob storage backends
///
/// A `put` returns an opaque handle that is stored on the Snapshot record
/// and later passed to `get`/`delete`. Implementations must be safe for
/// concurrent use.
pub trait BlobStore: Send + Sync {
    /// Stores bytes under a key, returning the handle to retrieve them
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> StorageResult<String>;

    /// Retrieves the bytes behind a handle
    fn get(&self, handle: &str) -> StorageResult<Vec<u8>>;

    /// Deletes the blob behind a handle
    fn delete(&self, handle: &str) -> StorageResult<()>;
}

/// Filesystem-backed blob store
///
/// Keys map to paths under a root directory; the handle is the key itself.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates a filesystem blob store rooted at the given directory
    ///
    /// The directory is created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        // Keys are generated internally, but reject traversal anyway.
        if key.split('/').any(|part| part == "..") || key.starts_with('/') {
            return Err(StorageError::BlobNotFound(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> StorageResult<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(key.to_string())
    }

    fn get(&self, handle: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(handle)?;
        std::fs::read(&path).map_err(|_| StorageError::BlobNotFound(handle.to_string()))
    }

    fn delete(&self, handle: &str) -> StorageResult<()> {
        let path = self.path_for(handle)?;
        std::fs::remove_file(&path)?;
        Ok(())
    }
}

/// In-memory blob store used by tests
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> StorageResult<String> {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(key.to_string())
    }

    fn get(&self, handle: &str) -> StorageResult<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or_else(|| StorageError::BlobNotFound(handle.to_string()))
    }

    fn delete(&self, handle: &str) -> StorageResult<()> {
        self.blobs
            .lock()
            .unwrap()
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| StorageError::BlobNotFound(handle.to_string()))
    }
}
