//! Position store implementation
//!
//! Provides file-based persistence of the position table with atomic writes.

use crate::error::{Error, Result};
use crate::types::{table_entries, Offset, Partition, PositionTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Current version of the persisted file layout
const SNAPSHOT_VERSION: u32 = 1;

/// On-disk representation of the position table
#[derive(Debug, Serialize, Deserialize)]
struct PositionSnapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    #[serde(with = "table_entries")]
    positions: PositionTable,
}

/// Durable local cache of the partition → offset table
#[derive(Debug)]
pub struct PositionStore {
    /// Path to the position file
    path: PathBuf,
    /// Current table (cached)
    table: Arc<RwLock<PositionTable>>,
}

impl PositionStore {
    /// Create a store backed by the given file. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            table: Arc::new(RwLock::new(PositionTable::new())),
        }
    }

    /// Create an in-memory store (no file persistence)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            table: Arc::new(RwLock::new(PositionTable::new())),
        }
    }

    /// Replace the in-memory table with the last persisted one.
    ///
    /// A missing file yields an empty table.
    pub async fn load(&self) -> Result<()> {
        let mut table = self.table.write().await;

        if self.is_in_memory() || !self.path.exists() {
            debug!(path = %self.path.display(), "No persisted positions, starting empty");
            table.clear();
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::state(format!("Failed to read position file: {e}")))?;

        let snapshot: PositionSnapshot = serde_json::from_str(&contents)
            .map_err(|e| Error::state(format!("Failed to parse position file: {e}")))?;

        debug!(
            path = %self.path.display(),
            positions = snapshot.positions.len(),
            saved_at = %snapshot.saved_at,
            "Loaded positions"
        );
        *table = snapshot.positions;

        Ok(())
    }

    /// Write the current table to disk.
    ///
    /// The table is locked exclusively for the whole write, so no merge,
    /// put or synchronize interleaves. The temp file is synced, renamed over
    /// the target and the directory entry is synced before returning.
    pub async fn persist(&self) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        let table = self.table.write().await;
        let snapshot = PositionSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            positions: table.clone(),
        };
        let contents = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| Error::persist(format!("Failed to serialize positions: {e}")))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::persist(format!("Failed to create store directory: {e}")))?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        let replaced = match write_synced(&temp_path, &contents).await {
            Ok(()) => tokio::fs::rename(&temp_path, &self.path)
                .await
                .map_err(|e| Error::persist(format!("Failed to rename position file: {e}"))),
            Err(e) => Err(e),
        };
        if let Err(e) = replaced {
            remove_temp_file(&temp_path).await;
            return Err(e);
        }

        sync_dir(dir).await?;

        debug!(path = %self.path.display(), positions = table.len(), "Persisted positions");
        Ok(())
    }

    /// Get a read lock on the current table
    pub async fn table(&self) -> tokio::sync::RwLockReadGuard<'_, PositionTable> {
        self.table.read().await
    }

    /// Get a write lock on the current table
    pub async fn table_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, PositionTable> {
        self.table.write().await
    }

    /// Get the offset for a partition
    pub async fn get(&self, partition: &Partition) -> Option<Offset> {
        self.table.read().await.get(partition).cloned()
    }

    /// Set the offset for a partition
    pub async fn put(&self, partition: Partition, offset: Offset) {
        self.table.write().await.insert(partition, offset);
    }

    /// Set offsets for many partitions under one lock
    pub async fn put_all(&self, positions: PositionTable) {
        self.table.write().await.extend(positions);
    }

    /// Remove a partition, returning its last offset
    pub async fn remove(&self, partition: &Partition) -> Option<Offset> {
        self.table.write().await.remove(partition)
    }

    /// Copy of the full table
    pub async fn snapshot(&self) -> PositionTable {
        self.table.read().await.clone()
    }

    /// Number of tracked partitions
    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    /// Whether no partition is tracked
    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }

    /// Fold a delivered table into the local one.
    ///
    /// Absent partitions are inserted, differing offsets are overwritten and
    /// equal offsets are left alone. Returns whether anything changed.
    pub async fn merge(&self, incoming: &PositionTable) -> bool {
        if incoming.is_empty() {
            return false;
        }

        let mut table = self.table.write().await;
        let mut changed = false;
        for (partition, offset) in incoming {
            match table.entry(partition.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(offset.clone());
                    changed = true;
                }
                Entry::Occupied(mut slot) => {
                    if slot.get() != offset {
                        slot.insert(offset.clone());
                        changed = true;
                    }
                }
            }
        }
        changed
    }

    /// Get the position file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

async fn write_synced(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::persist(format!("Failed to create temp file: {e}")))?;
    file.write_all(contents)
        .await
        .map_err(|e| Error::persist(format!("Failed to write position file: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| Error::persist(format!("Failed to sync position file: {e}")))
}

async fn remove_temp_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp position file"),
    }
}

/// Flush a directory so a rename inside it survives a crash.
///
/// Platforms that cannot open or sync directories are treated as synced.
async fn sync_dir(dir: &Path) -> Result<()> {
    let file = match tokio::fs::File::open(dir).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return Ok(()),
        Err(e) => {
            return Err(Error::persist(format!(
                "Failed to open store directory '{}': {e}",
                dir.display()
            )))
        }
    };
    match file.sync_all().await {
        Ok(()) => Ok(()),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::Unsupported | std::io::ErrorKind::PermissionDenied
            ) =>
        {
            Ok(())
        }
        Err(e) => Err(Error::persist(format!("Failed to sync store directory: {e}"))),
    }
}

impl Clone for PositionStore {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            table: Arc::clone(&self.table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_dir() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).await.unwrap();

        let missing = dir.path().join("missing");
        assert!(matches!(sync_dir(&missing).await, Err(Error::Persist { .. })));
    }

    #[tokio::test]
    async fn test_remove_temp_file_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position.tmp");
        std::fs::write(&path, "partial").unwrap();

        remove_temp_file(&path).await;
        assert!(!path.exists());
        remove_temp_file(&path).await;
    }
}
