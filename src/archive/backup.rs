//! Archive construction.
//!
//! Every tracked path is archived regardless of strategy; the strategy
//! only changes restore behavior. The walk and exclusion computation run
//! first and produce a plan; the tar stream is only written when the plan
//! differs from the stamps of the previous backup (or `force` is given).

use super::{ArchiveManifest, ExclusionRules, Failure, MANIFEST_NAME, ManifestPath};
use crate::errors::Error;
use crate::settings::Settings;
use crate::storage::state::{EntryStamp, State};
use crate::utils::{resolve_pattern, strip_root};
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::{Builder as TarBuilder, EntryType, Header};
use walkdir::WalkDir;

/// Gzip level for archive output.
const COMPRESSION_LEVEL: u32 = 6;

/// One entry scheduled for the archive.
#[derive(Debug, Clone)]
struct PlanEntry {
    /// Resolved source path on the live filesystem
    source: PathBuf,
    /// Member name inside the archive (root stripped)
    archive_name: PathBuf,
    kind: PlanKind,
    stamp: EntryStamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanKind {
    File,
    Directory,
    Symlink,
}

/// Outcome of a backup run.
#[derive(Debug)]
pub struct BackupReport {
    pub archive_path: PathBuf,
    /// Archived member count, excluding the manifest
    pub entries: usize,
    /// True when the archive was already up to date and not rewritten
    pub skipped_unchanged: bool,
    pub failures: Vec<Failure>,
}

/// Builds backup archives from tracked-path settings and the decision
/// ledger.
pub struct BackupEngine<'a> {
    settings: &'a Settings,
    state: &'a mut State,
    state_path: &'a Path,
}

impl<'a> BackupEngine<'a> {
    pub fn new(settings: &'a Settings, state: &'a mut State, state_path: &'a Path) -> Self {
        Self {
            settings,
            state,
            state_path,
        }
    }

    /// Runs a backup into `archive_path`.
    ///
    /// Environment variables in patterns are resolved against the current
    /// environment; an unresolved variable fails that tracked path only
    /// and the rest continue. Without `force`, an archive whose entry
    /// stamps match the previous run is left untouched.
    ///
    /// # Errors
    ///
    /// Fails on archive-wide problems (cannot create the output file,
    /// cannot persist state). Per-path and per-entry problems land in the
    /// report's failure list instead.
    pub fn run(&mut self, archive_path: &Path, force: bool) -> Result<BackupReport> {
        let created = chrono::Utc::now().timestamp();
        let mut manifest = ArchiveManifest::from_state(self.state, created);
        let mut failures = Vec::new();
        let mut entries: Vec<PlanEntry> = Vec::new();

        let mut tracked = self.settings.tracked_paths.clone();
        tracked.sort_by(|a, b| a.pattern.cmp(&b.pattern));

        for tracked_path in &tracked {
            let mut manifest_path = ManifestPath {
                pattern: tracked_path.pattern.clone(),
                strategy: tracked_path.strategy,
                exclude_subpaths: tracked_path.exclude_subpaths.clone(),
                exclude_patterns: tracked_path.exclude_patterns.clone(),
                archive_root: None,
            };

            match self.plan_tracked_path(tracked_path, &mut entries, &mut failures) {
                Ok(archive_root) => manifest_path.archive_root = archive_root,
                Err(e) => failures.push(Failure::new(tracked_path.pattern.clone(), &e)),
            }

            manifest.paths.push(manifest_path);
        }

        // Stable member order independent of walk scheduling
        entries.sort_by(|a, b| a.archive_name.cmp(&b.archive_name));
        entries.dedup_by(|a, b| a.archive_name == b.archive_name);

        let stamps: BTreeMap<String, EntryStamp> = entries
            .iter()
            .map(|e| {
                (
                    e.archive_name.to_string_lossy().into_owned(),
                    e.stamp.clone(),
                )
            })
            .collect();

        if !force && archive_path.exists() && stamps == self.state.archive_stamps {
            tracing::info!("archive is up to date, skipping rebuild");
            return Ok(BackupReport {
                archive_path: archive_path.to_path_buf(),
                entries: entries.len(),
                skipped_unchanged: true,
                failures,
            });
        }

        self.write_archive(archive_path, &manifest, &entries, &mut failures)?;

        self.state.archive_stamps = stamps;
        self.state.save(self.state_path)?;

        Ok(BackupReport {
            archive_path: archive_path.to_path_buf(),
            entries: entries.len(),
            skipped_unchanged: false,
            failures,
        })
    }

    /// Resolves one tracked path and plans its surviving entries.
    /// Returns the archive root for the manifest, or `None` when the
    /// source does not exist.
    fn plan_tracked_path(
        &self,
        tracked: &crate::settings::TrackedPath,
        entries: &mut Vec<PlanEntry>,
        failures: &mut Vec<Failure>,
    ) -> Result<Option<PathBuf>> {
        let rules = ExclusionRules::for_tracked_path(tracked)?;
        let root = resolve_pattern(&tracked.pattern)?;

        if fs::symlink_metadata(&root).is_err() {
            tracing::warn!(path = %root.display(), "tracked path missing, skipping");
            return Ok(None);
        }

        let walker = WalkDir::new(&root).follow_links(false).into_iter();
        for item in walker.filter_entry(|e| {
            let relative = e.path().strip_prefix(&root).unwrap_or(e.path());
            !rules.excludes(e.path(), relative)
        }) {
            let dir_entry = match item {
                Ok(dir_entry) => dir_entry,
                Err(e) => {
                    let subject = e.path().map_or_else(
                        || root.display().to_string(),
                        |p| p.display().to_string(),
                    );
                    failures.push(Failure::new(subject, &anyhow::Error::from(e)));
                    continue;
                }
            };

            match plan_entry(dir_entry.path()) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {
                    tracing::debug!(path = %dir_entry.path().display(), "unsupported entry kind");
                }
                Err(e) => failures.push(Failure::new(dir_entry.path().display().to_string(), &e)),
            }
        }

        Ok(Some(strip_root(&root)))
    }

    fn write_archive(
        &self,
        archive_path: &Path,
        manifest: &ArchiveManifest,
        entries: &[PlanEntry],
        failures: &mut Vec<Failure>,
    ) -> Result<()> {
        if let Some(parent) = archive_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let file = File::create(archive_path)
            .with_context(|| format!("Failed to create archive: {}", archive_path.display()))?;
        let encoder = GzEncoder::new(file, Compression::new(COMPRESSION_LEVEL));
        let mut builder = TarBuilder::new(encoder);
        builder.follow_symlinks(false);

        let manifest_json = manifest.to_json()?;
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(manifest_json.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(u64::try_from(manifest.created).unwrap_or(0));
        header.set_cksum();
        builder
            .append_data(&mut header, MANIFEST_NAME, manifest_json.as_bytes())
            .context("Failed to write archive manifest")?;

        for entry in entries {
            if let Err(e) = append_entry(&mut builder, entry) {
                failures.push(Failure::new(entry.source.display().to_string(), &e));
            }
        }

        let encoder = builder
            .into_inner()
            .context("Failed to finalize archive")?;
        encoder.finish().context("Failed to flush archive")?;

        tracing::info!(
            archive = %archive_path.display(),
            entries = entries.len(),
            "archive written"
        );
        Ok(())
    }
}

/// Stats one path into a plan entry. Sockets, FIFOs, and devices are not
/// archivable and yield `None`.
fn plan_entry(path: &Path) -> Result<Option<PlanEntry>> {
    let meta = fs::symlink_metadata(path).map_err(|e| Error::IoFailure {
        path: path.to_path_buf(),
        source: e,
    })?;

    let file_type = meta.file_type();
    let kind = if file_type.is_symlink() {
        PlanKind::Symlink
    } else if file_type.is_dir() {
        PlanKind::Directory
    } else if file_type.is_file() {
        PlanKind::File
    } else {
        return Ok(None);
    };

    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(0));

    Ok(Some(PlanEntry {
        source: path.to_path_buf(),
        archive_name: strip_root(path),
        kind,
        stamp: EntryStamp {
            size: meta.len(),
            modified,
            mode: mode_of(&meta),
        },
    }))
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_meta: &fs::Metadata) -> u32 {
    0o644
}

fn append_entry<W: std::io::Write>(builder: &mut TarBuilder<W>, entry: &PlanEntry) -> Result<()> {
    match entry.kind {
        PlanKind::Directory => builder
            .append_dir(&entry.archive_name, &entry.source)
            .with_context(|| format!("Failed to archive {}", entry.source.display()))?,
        PlanKind::File => builder
            .append_path_with_name(&entry.source, &entry.archive_name)
            .with_context(|| format!("Failed to archive {}", entry.source.display()))?,
        PlanKind::Symlink => {
            let target = fs::read_link(&entry.source).map_err(|e| Error::IoFailure {
                path: entry.source.clone(),
                source: e,
            })?;
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            header.set_mode(entry.stamp.mode);
            header.set_mtime(u64::try_from(entry.stamp.modified).unwrap_or(0));
            builder
                .append_link(&mut header, &entry.archive_name, &target)
                .with_context(|| format!("Failed to archive {}", entry.source.display()))?;
        }
    }
    Ok(())
}
