//! Diff computation between snapshots, or between a snapshot and a bare
//! cutoff timestamp.
//!
//! Two modes with deliberately different reporting power:
//!
//! - **Snapshot-to-snapshot** classifies every path in the key union as
//!   added, removed, or modified (size, modification time, or kind).
//! - **Snapshot-to-cutoff** has no baseline snapshot, only a timestamp, so
//!   it reports a single changed-since set (surfaced as `added`). True
//!   removals after the cutoff are structurally unknowable in this mode
//!   and are intentionally not inferred.

use crate::errors::Error;
use crate::storage::Snapshot;
use crate::storage::snapshots::SnapshotStore;
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Three disjoint path sets. Computed on demand, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// In target, absent in baseline (or changed-since in cutoff mode)
    pub added: BTreeSet<PathBuf>,
    /// In baseline, absent in target
    pub removed: BTreeSet<PathBuf>,
    /// Present in both with differing metadata
    pub modified: BTreeSet<PathBuf>,
}

impl DiffResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// All affected paths in one sorted sequence.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.added
            .iter()
            .chain(self.removed.iter())
            .chain(self.modified.iter())
    }
}

/// Resolves diff requests against a [`SnapshotStore`].
pub struct DiffEngine<'a> {
    store: &'a SnapshotStore,
}

impl<'a> DiffEngine<'a> {
    #[must_use]
    pub const fn new(store: &'a SnapshotStore) -> Self {
        Self { store }
    }

    /// Computes a diff from optional `from`/`to` timestamps.
    ///
    /// Resolution rules:
    /// - `from` matching a stored key: snapshot-to-snapshot against `to`
    ///   (or the latest snapshot).
    /// - `from` with no stored snapshot: cutoff mode against `to` (or the
    ///   closest later-or-equal snapshot).
    /// - no `from`: baseline defaults to the latest snapshot strictly
    ///   before the target; with neither bound given, fewer than two
    ///   snapshots is [`Error::InsufficientSnapshots`].
    ///
    /// `paths`, when non-empty, restricts the result to entries under the
    /// given roots.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an explicit `to` with no stored snapshot,
    /// [`Error::InsufficientSnapshots`] when defaults cannot be resolved.
    pub fn diff(
        &self,
        from_time: Option<i64>,
        to_time: Option<i64>,
        paths: &[PathBuf],
    ) -> Result<DiffResult> {
        let keys = self.store.list_keys()?;

        match from_time {
            Some(from) if keys.binary_search(&from).is_ok() => {
                let baseline = self.store.load(from)?;
                let target = match to_time {
                    Some(to) => self.store.load(to)?,
                    None => self.load_latest(&keys)?,
                };
                diff_snapshots(&baseline, &target, paths)
            }
            Some(cutoff) => {
                // No snapshot at the cutoff: changed-since mode
                let target = match to_time {
                    Some(to) => self.store.load(to)?,
                    None => self.store.load_at_or_after(cutoff)?,
                };
                Ok(changed_since(&target, cutoff, paths))
            }
            None => {
                let target = match to_time {
                    Some(to) => self.store.load(to)?,
                    None => self.load_latest(&keys)?,
                };
                let baseline_key = keys
                    .iter()
                    .rev()
                    .find(|k| **k < target.timestamp)
                    .copied()
                    .ok_or(Error::InsufficientSnapshots)?;
                let baseline = self.store.load(baseline_key)?;
                diff_snapshots(&baseline, &target, paths)
            }
        }
    }

    fn load_latest(&self, keys: &[i64]) -> Result<Snapshot> {
        let latest = *keys.last().ok_or(Error::InsufficientSnapshots)?;
        self.store.load(latest)
    }
}

/// Classifies every path in the key union of two snapshots.
///
/// Diffing a snapshot against itself (or two captures of the same
/// filesystem state) yields empty sets. A path is never in more than one
/// set.
///
/// # Errors
///
/// Fails when the target snapshot is older than the baseline; callers
/// must pass a later-or-equal target.
pub fn diff_snapshots(
    baseline: &Snapshot,
    target: &Snapshot,
    paths: &[PathBuf],
) -> Result<DiffResult> {
    if target.timestamp < baseline.timestamp {
        anyhow::bail!(
            "target snapshot {} is older than baseline {}",
            target.timestamp,
            baseline.timestamp
        );
    }

    let mut result = DiffResult::default();
    if target.timestamp == baseline.timestamp {
        return Ok(result);
    }

    for (path, target_entry) in &target.entries {
        if !selected(path, paths) {
            continue;
        }
        match baseline.entries.get(path) {
            None => {
                result.added.insert(path.clone());
            }
            Some(baseline_entry) => {
                if baseline_entry.metadata_differs(target_entry) {
                    result.modified.insert(path.clone());
                }
            }
        }
    }

    for path in baseline.entries.keys() {
        if selected(path, paths) && !target.entries.contains_key(path) {
            result.removed.insert(path.clone());
        }
    }

    Ok(result)
}

/// Reports every entry modified after `cutoff` as `added`.
///
/// The asymmetry is intentional: with no baseline snapshot there is
/// nothing to classify removals or true modifications against.
#[must_use]
pub fn changed_since(target: &Snapshot, cutoff: i64, paths: &[PathBuf]) -> DiffResult {
    let mut result = DiffResult::default();

    for (path, entry) in &target.entries {
        if entry.modified > cutoff && selected(path, paths) {
            result.added.insert(path.clone());
        }
    }

    result
}

fn selected(path: &Path, filter: &[PathBuf]) -> bool {
    filter.is_empty() || filter.iter().any(|root| path.starts_with(root))
}
