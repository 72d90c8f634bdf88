/// Snapshot persistence keyed by capture timestamp
pub mod snapshots;
/// Decision ledger and live-state baseline persistence
pub mod state;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Kind of filesystem object a [`FileEntry`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Sockets, FIFOs, devices. Recorded so they show up in diffs but
    /// never carried into archives.
    Other,
}

/// Metadata for one filesystem object, captured at scan time.
///
/// Identity is the normalized absolute `path`. Entries are immutable once
/// captured; a later scan produces new entries rather than mutating these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute, normalized path
    pub path: PathBuf,
    /// Object kind
    pub kind: EntryKind,
    /// Size in bytes
    pub size: u64,
    /// Modification time, epoch seconds
    pub modified: i64,
    /// Sub-second part of the modification time, nanoseconds
    pub modified_ns: u32,
    /// Unix permission bits
    pub mode: u32,
    /// Symlink target, for `kind == Symlink`
    pub link_target: Option<PathBuf>,
}

impl FileEntry {
    /// Whether two captures of the same path should classify as modified.
    ///
    /// Comparison is kind, size, and modification time at one-second
    /// granularity; sub-second drift alone does not count as a change.
    #[must_use]
    pub fn metadata_differs(&self, other: &Self) -> bool {
        self.kind != other.kind || self.size != other.size || self.modified != other.modified
    }
}

/// A timestamped, immutable index of filesystem metadata across the
/// scanned roots.
///
/// The timestamp is taken at scan start and is the snapshot's unique
/// store key. Entries are keyed by normalized path, so iteration order is
/// deterministic regardless of scan scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Capture time, epoch seconds; unique store key
    pub timestamp: i64,
    /// The roots that were scanned
    pub roots: Vec<PathBuf>,
    /// Every visited object, keyed by path
    pub entries: BTreeMap<PathBuf, FileEntry>,
    /// Non-fatal problems encountered during the walk (permission denied,
    /// vanished entries). A snapshot with warnings is still valid.
    pub warnings: Vec<String>,
}
