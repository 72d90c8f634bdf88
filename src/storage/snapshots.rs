use super::Snapshot;
use crate::errors::Error;
use crate::utils::serialization;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use zstd::stream::{decode_all, encode_all};

/// File extension for persisted snapshots.
const SNAPSHOT_EXT: &str = "snap";

/// Persists snapshots, one compressed file per capture timestamp.
///
/// Keys are strictly increasing epoch seconds; saving a key that already
/// exists is an error so no two snapshots ever share a timestamp. The
/// on-disk format (bincode + zstd) round-trips every [`super::FileEntry`]
/// field losslessly.
pub struct SnapshotStore {
    snapshots_dir: PathBuf,
    compression_level: i32,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(snapshots_dir: PathBuf, compression_level: i32) -> Self {
        Self {
            snapshots_dir,
            compression_level,
        }
    }

    fn key_path(&self, key: i64) -> PathBuf {
        self.snapshots_dir.join(format!("{key}.{SNAPSHOT_EXT}"))
    }

    /// Persists a snapshot under its timestamp key and returns the key.
    ///
    /// # Errors
    ///
    /// Fails if a snapshot with the same timestamp already exists or the
    /// file cannot be written.
    pub fn save(&self, snapshot: &Snapshot) -> Result<i64> {
        let path = self.key_path(snapshot.timestamp);
        if path.exists() {
            anyhow::bail!("snapshot {} already exists", snapshot.timestamp);
        }

        fs::create_dir_all(&self.snapshots_dir).with_context(|| {
            format!(
                "Failed to create snapshots directory: {}",
                self.snapshots_dir.display()
            )
        })?;

        let serialized = serialization::serialize(snapshot)?;
        let compressed = encode_all(&serialized[..], self.compression_level)?;
        fs::write(&path, compressed)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;

        Ok(snapshot.timestamp)
    }

    /// Loads the snapshot stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no snapshot has that key.
    pub fn load(&self, key: i64) -> Result<Snapshot> {
        let path = self.key_path(key);
        if !path.exists() {
            return Err(Error::NotFound(format!("snapshot {key}")).into());
        }

        let compressed = fs::read(&path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        let decompressed = decode_all(&compressed[..])?;
        serialization::deserialize(&decompressed)
            .with_context(|| format!("Failed to deserialize snapshot {key}"))
    }

    /// Lists all stored keys, ascending.
    ///
    /// # Errors
    ///
    /// Fails only on directory read errors; a missing directory is an
    /// empty store.
    pub fn list_keys(&self) -> Result<Vec<i64>> {
        if !self.snapshots_dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.snapshots_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some(SNAPSHOT_EXT)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Ok(key) = stem.parse::<i64>()
            {
                keys.push(key);
            }
        }

        keys.sort_unstable();
        Ok(keys)
    }

    /// Loads the snapshot with the smallest key `>= cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if every stored snapshot predates the
    /// cutoff.
    pub fn load_at_or_after(&self, cutoff: i64) -> Result<Snapshot> {
        let key = self
            .list_keys()?
            .into_iter()
            .find(|k| *k >= cutoff)
            .ok_or_else(|| Error::NotFound(format!("snapshot at or after {cutoff}")))?;
        self.load(key)
    }

    /// Removes the snapshot stored under `key`. Pruning is always an
    /// explicit operator action; nothing in the core ever calls this.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no snapshot has that key.
    pub fn remove(&self, key: i64) -> Result<()> {
        let path = self.key_path(key);
        if !path.exists() {
            return Err(Error::NotFound(format!("snapshot {key}")).into());
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove snapshot: {}", path.display()))
    }
}
