//! Filesystem scanning for snapshot capture.
//!
//! The scanner walks each configured root, including the root itself, and
//! records one [`FileEntry`] per visited object. Symlinks are recorded
//! with their target string and never followed, so cycles cannot occur and
//! linked trees are not double-counted. Unreadable or vanished entries are
//! skipped with a recorded warning; a partial snapshot is still valid.
//!
//! Independent second-level subtrees are walked by rayon's bounded worker
//! pool. The final mapping is a sorted merge keyed by normalized path, so
//! the result is independent of worker scheduling: two scans of an
//! unchanged tree always diff empty against each other.

use crate::settings::ScanSettings;
use crate::storage::{EntryKind, FileEntry, Snapshot};
use crate::utils::make_absolute;
use anyhow::{Context, Result};
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Walks filesystem roots and produces [`Snapshot`]s.
pub struct Scanner {
    exclude_paths: BTreeSet<PathBuf>,
    exclude_patterns: Vec<Regex>,
}

impl Scanner {
    /// Builds a scanner from the global scan settings.
    ///
    /// # Errors
    ///
    /// Returns an error if an exclude pattern is not a valid regex.
    pub fn from_settings(scan: &ScanSettings) -> Result<Self> {
        let exclude_patterns = scan
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid scan exclude pattern: {p}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            exclude_paths: scan.exclude_paths.iter().cloned().collect(),
            exclude_patterns,
        })
    }

    /// Scans the given roots and assembles a snapshot stamped with
    /// `timestamp` (capture start time, not per-entry).
    ///
    /// # Errors
    ///
    /// Returns an error only when a root cannot be normalized; per-entry
    /// problems become snapshot warnings instead.
    pub fn scan(&self, roots: &[PathBuf], timestamp: i64) -> Result<Snapshot> {
        let mut normalized: Vec<PathBuf> = roots
            .iter()
            .map(|r| make_absolute(r))
            .collect::<Result<_>>()?;
        normalized.sort();
        normalized.dedup();

        let mut entries = BTreeMap::new();
        let mut warnings = Vec::new();

        for root in &normalized {
            self.scan_root(root, &mut entries, &mut warnings);
        }

        tracing::debug!(
            entries = entries.len(),
            warnings = warnings.len(),
            "scan complete"
        );

        Ok(Snapshot {
            timestamp,
            roots: normalized,
            entries,
            warnings,
        })
    }

    fn scan_root(
        &self,
        root: &Path,
        entries: &mut BTreeMap<PathBuf, FileEntry>,
        warnings: &mut Vec<String>,
    ) {
        if self.is_excluded(root) {
            return;
        }

        let meta = match fs::symlink_metadata(root) {
            Ok(meta) => meta,
            Err(e) => {
                warnings.push(format!("{}: {e}", root.display()));
                return;
            }
        };

        entries.insert(root.to_path_buf(), entry_from_metadata(root, &meta));

        if !meta.file_type().is_dir() {
            return;
        }

        // Walk direct children as independent subtrees on the worker
        // pool. Collect preserves input order, so warnings stay
        // deterministic; the entry map is sorted by key regardless.
        let mut children: Vec<PathBuf> = match fs::read_dir(root) {
            Ok(iter) => iter
                .filter_map(|e| match e {
                    Ok(entry) => Some(entry.path()),
                    Err(err) => {
                        warnings.push(format!("{}: {err}", root.display()));
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warnings.push(format!("{}: {e}", root.display()));
                return;
            }
        };
        children.sort();

        let results: Vec<(Vec<FileEntry>, Vec<String>)> = children
            .par_iter()
            .map(|child| self.walk_subtree(child))
            .collect();

        for (subtree_entries, subtree_warnings) in results {
            for entry in subtree_entries {
                entries.insert(entry.path.clone(), entry);
            }
            warnings.extend(subtree_warnings);
        }
    }

    fn walk_subtree(&self, subtree: &Path) -> (Vec<FileEntry>, Vec<String>) {
        let mut entries = Vec::new();
        let mut warnings = Vec::new();

        let walker = WalkDir::new(subtree)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e.path()));

        for item in walker {
            let dir_entry = match item {
                Ok(dir_entry) => dir_entry,
                Err(e) => {
                    let subject = e
                        .path()
                        .map_or_else(|| subtree.display().to_string(), |p| p.display().to_string());
                    warnings.push(format!("{subject}: {e}"));
                    continue;
                }
            };

            match fs::symlink_metadata(dir_entry.path()) {
                Ok(meta) => entries.push(entry_from_metadata(dir_entry.path(), &meta)),
                // Vanished between listing and stat
                Err(e) => warnings.push(format!("{}: {e}", dir_entry.path().display())),
            }
        }

        (entries, warnings)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude_paths.contains(path) {
            return true;
        }

        let text = path.to_string_lossy();
        self.exclude_patterns.iter().any(|p| p.is_match(&text))
    }
}

/// Builds a [`FileEntry`] from already-fetched symlink metadata.
fn entry_from_metadata(path: &Path, meta: &fs::Metadata) -> FileEntry {
    let file_type = meta.file_type();
    let kind = if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };

    let (modified, modified_ns) = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or((0, 0), |d| {
            (i64::try_from(d.as_secs()).unwrap_or(0), d.subsec_nanos())
        });

    let link_target = if kind == EntryKind::Symlink {
        fs::read_link(path).ok()
    } else {
        None
    };

    FileEntry {
        path: path.to_path_buf(),
        kind,
        size: meta.len(),
        modified,
        modified_ns,
        mode: permissions_mode(meta),
        link_target,
    }
}

#[cfg(unix)]
fn permissions_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn permissions_mode(_meta: &fs::Metadata) -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn scanner() -> Scanner {
        Scanner::from_settings(&ScanSettings::default()).unwrap()
    }

    fn tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/nested")).unwrap();
        fs::write(temp.path().join("a/file.txt"), "hello").unwrap();
        fs::write(temp.path().join("a/nested/deep.txt"), "deep").unwrap();
        fs::write(temp.path().join("top.txt"), "top").unwrap();
        symlink("a/file.txt", temp.path().join("link")).unwrap();
        temp
    }

    #[test]
    fn test_scan_includes_root_and_descendants() {
        let temp = tree();
        let snapshot = scanner().scan(&[temp.path().to_path_buf()], 1000).unwrap();

        assert!(snapshot.entries.contains_key(temp.path()));
        assert!(snapshot.entries.contains_key(&temp.path().join("a")));
        assert!(
            snapshot
                .entries
                .contains_key(&temp.path().join("a/nested/deep.txt"))
        );
        assert_eq!(snapshot.timestamp, 1000);
        assert!(snapshot.warnings.is_empty());
    }

    #[test]
    fn test_symlink_recorded_not_followed() {
        let temp = tree();
        let snapshot = scanner().scan(&[temp.path().to_path_buf()], 1000).unwrap();

        let link = snapshot.entries.get(&temp.path().join("link")).unwrap();
        assert_eq!(link.kind, EntryKind::Symlink);
        assert_eq!(link.link_target, Some(PathBuf::from("a/file.txt")));
    }

    #[test]
    fn test_rescan_of_unchanged_tree_is_identical() {
        let temp = tree();
        let s = scanner();
        let first = s.scan(&[temp.path().to_path_buf()], 1000).unwrap();
        let second = s.scan(&[temp.path().to_path_buf()], 2000).unwrap();

        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn test_missing_root_is_warning_not_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone");
        let snapshot = scanner().scan(&[missing.clone()], 1000).unwrap();

        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.warnings.len(), 1);
        assert!(snapshot.warnings[0].contains("gone"));
    }

    #[test]
    fn test_exclude_path_skips_subtree() {
        let temp = tree();
        let settings = ScanSettings {
            exclude_paths: vec![temp.path().join("a")],
            exclude_patterns: vec![],
        };
        let snapshot = Scanner::from_settings(&settings)
            .unwrap()
            .scan(&[temp.path().to_path_buf()], 1000)
            .unwrap();

        assert!(!snapshot.entries.contains_key(&temp.path().join("a")));
        assert!(
            !snapshot
                .entries
                .contains_key(&temp.path().join("a/file.txt"))
        );
        assert!(snapshot.entries.contains_key(&temp.path().join("top.txt")));
    }

    #[test]
    fn test_exclude_pattern_skips_matches() {
        let temp = tree();
        let settings = ScanSettings {
            exclude_paths: vec![],
            exclude_patterns: vec![r"\.txt$".to_string()],
        };
        let snapshot = Scanner::from_settings(&settings)
            .unwrap()
            .scan(&[temp.path().to_path_buf()], 1000)
            .unwrap();

        assert!(!snapshot.entries.contains_key(&temp.path().join("top.txt")));
        assert!(snapshot.entries.contains_key(&temp.path().join("a")));
    }

    #[test]
    fn test_overlapping_roots_no_duplicates() {
        let temp = tree();
        let snapshot = scanner()
            .scan(
                &[temp.path().to_path_buf(), temp.path().join("a")],
                1000,
            )
            .unwrap();

        // Map keys are unique by construction; make sure nested root's
        // entries agree with the outer walk
        let file = snapshot.entries.get(&temp.path().join("a/file.txt")).unwrap();
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.size, 5);
    }

    #[test]
    fn test_invalid_exclude_pattern_rejected() {
        let settings = ScanSettings {
            exclude_paths: vec![],
            exclude_patterns: vec!["[unclosed".to_string()],
        };
        assert!(Scanner::from_settings(&settings).is_err());
    }
}
