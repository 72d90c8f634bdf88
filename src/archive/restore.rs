//! Restore application.
//!
//! The archive is extracted to a scratch directory and validated in full
//! before anything on the live system is touched. The whole operation is
//! then computed as a list of [`PlannedAction`]s; dry-run stops there and
//! reports the plan, so a dry run has zero side effects by construction.
//! Execution walks the plan sequentially, collecting per-path and
//! per-entity failures into the report rather than aborting.

use super::{ArchiveManifest, ExclusionRules, Failure, MANIFEST_NAME};
use crate::errors::Error;
use crate::external::{ConfigStore, MergeTool, PackageManager};
use crate::storage::state::PackageDecision;
use crate::utils::resolve_pattern;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What to restore and how.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Compute and report the plan without executing any of it
    pub dry_run: bool,
    /// Treat every path as `manual`, yielding merge pairs
    pub interactive: bool,
    pub files: bool,
    pub packages: bool,
    pub configurations: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            interactive: false,
            files: true,
            packages: true,
            configurations: true,
        }
    }
}

/// One step of the restore, computed before anything executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Copy an extracted tree over the live path, overwriting
    CopyTree {
        extracted: PathBuf,
        live: PathBuf,
        pattern: String,
        exclude_subpaths: Vec<PathBuf>,
        exclude_patterns: Vec<String>,
    },
    /// Hand the pair to the operator (or the merge tool) instead of
    /// copying
    MergeTree {
        extracted: PathBuf,
        live: PathBuf,
        pattern: String,
    },
    InstallPackage(String),
    MarkDependency(String),
    PurgePackage(String),
    SetConfig {
        key: String,
        value: String,
    },
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CopyTree {
                extracted, live, ..
            } => write!(f, "copy {} -> {}", extracted.display(), live.display()),
            Self::MergeTree {
                extracted, live, ..
            } => write!(f, "merge {} {}", extracted.display(), live.display()),
            Self::InstallPackage(name) => write!(f, "install package {name}"),
            Self::MarkDependency(name) => write!(f, "mark package {name} as dependency"),
            Self::PurgePackage(name) => write!(f, "purge package {name}"),
            Self::SetConfig { key, value } => write!(f, "set configuration {key} = {value}"),
        }
    }
}

/// Outcome of a restore run: the plan, what was executed, and an
/// itemized failure list for partial success.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub planned: Vec<PlannedAction>,
    /// Actions that ran (0 on dry-run)
    pub executed: usize,
    pub failures: Vec<Failure>,
    /// (extracted, live) pairs surfaced for manual merging
    pub merge_pairs: Vec<(PathBuf, PathBuf)>,
}

/// Applies an archive to the live system through collaborator traits.
#[derive(Default)]
pub struct RestoreEngine<'a> {
    package_manager: Option<&'a dyn PackageManager>,
    config_store: Option<&'a dyn ConfigStore>,
    merge_tool: Option<&'a MergeTool>,
}

impl<'a> RestoreEngine<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_package_manager(mut self, manager: &'a dyn PackageManager) -> Self {
        self.package_manager = Some(manager);
        self
    }

    #[must_use]
    pub fn with_config_store(mut self, store: &'a dyn ConfigStore) -> Self {
        self.config_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_merge_tool(mut self, tool: &'a MergeTool) -> Self {
        self.merge_tool = Some(tool);
        self
    }

    /// Runs a restore from `archive_path`.
    ///
    /// # Errors
    ///
    /// Fatal conditions abort before any live mutation:
    /// [`Error::ArchiveUnreadable`] when the archive cannot be read in
    /// full, [`Error::UnresolvedVariable`] when a tracked-path pattern
    /// cannot be resolved against the current environment. Everything
    /// else is collected into the report.
    pub fn run(&self, archive_path: &Path, options: &RestoreOptions) -> Result<ApplyReport> {
        let scratch = tempfile::Builder::new()
            .prefix("sysback-restore.")
            .tempdir()
            .context("Failed to create scratch directory")?;

        let manifest = extract_archive(archive_path, scratch.path())?;

        let mut failures = Vec::new();
        let planned = self.plan(&manifest, scratch.path(), options, &mut failures)?;
        let mut report = ApplyReport {
            planned,
            failures,
            ..ApplyReport::default()
        };

        if options.dry_run {
            return Ok(report);
        }

        self.execute(&mut report);

        // Without a merge tool the extracted halves of the merge pairs
        // are the operator's to act on; they must outlive this run
        if self.merge_tool.is_none() && !report.merge_pairs.is_empty() {
            let _ = scratch.keep();
        }
        Ok(report)
    }

    fn plan(
        &self,
        manifest: &ArchiveManifest,
        scratch: &Path,
        options: &RestoreOptions,
        failures: &mut Vec<Failure>,
    ) -> Result<Vec<PlannedAction>> {
        let mut planned = Vec::new();

        if options.files {
            let mut paths = manifest.paths.clone();
            paths.sort_by(|a, b| a.pattern.cmp(&b.pattern));

            for manifest_path in &paths {
                if manifest_path.strategy == crate::settings::Strategy::BackupOnly {
                    continue;
                }
                let Some(archive_root) = &manifest_path.archive_root else {
                    continue;
                };

                // Unresolved variables are fatal for the whole restore
                let live = resolve_pattern(&manifest_path.pattern)?;
                let extracted = scratch.join(archive_root);

                if fs::symlink_metadata(&extracted).is_err() {
                    failures.push(Failure {
                        subject: manifest_path.pattern.clone(),
                        error: "recorded in manifest but missing from archive".to_string(),
                    });
                    continue;
                }

                if options.interactive
                    || manifest_path.strategy == crate::settings::Strategy::Manual
                {
                    planned.push(PlannedAction::MergeTree {
                        extracted,
                        live,
                        pattern: manifest_path.pattern.clone(),
                    });
                } else {
                    planned.push(PlannedAction::CopyTree {
                        extracted,
                        live,
                        pattern: manifest_path.pattern.clone(),
                        exclude_subpaths: manifest_path.exclude_subpaths.clone(),
                        exclude_patterns: manifest_path.exclude_patterns.clone(),
                    });
                }
            }
        }

        if options.packages && let Some(manager) = self.package_manager {
            match manager.installed() {
                Ok(installed) => {
                    for (name, decision) in &manifest.package_decisions {
                        let is_installed = installed.contains(name);
                        match decision {
                            PackageDecision::Track if !is_installed => {
                                planned.push(PlannedAction::InstallPackage(name.clone()));
                            }
                            PackageDecision::Remove if is_installed => {
                                planned.push(PlannedAction::PurgePackage(name.clone()));
                            }
                            PackageDecision::Dependency if is_installed => {
                                planned.push(PlannedAction::MarkDependency(name.clone()));
                            }
                            _ => {}
                        }
                    }
                }
                Err(e) => failures.push(Failure::new(manager.name(), &e)),
            }
        }

        if options.configurations && let Some(store) = self.config_store {
            match store.current() {
                Ok(current) => {
                    for (key, value) in &manifest.config_values {
                        if current.get(key) != Some(value) {
                            planned.push(PlannedAction::SetConfig {
                                key: key.clone(),
                                value: value.clone(),
                            });
                        }
                    }
                }
                Err(e) => failures.push(Failure::new(store.name(), &e)),
            }
        }

        Ok(planned)
    }

    fn execute(&self, report: &mut ApplyReport) {
        let planned = report.planned.clone();
        for action in &planned {
            tracing::info!(%action, "applying");
            match action {
                PlannedAction::CopyTree {
                    extracted,
                    live,
                    pattern,
                    exclude_subpaths,
                    exclude_patterns,
                } => match ExclusionRules::compile(exclude_subpaths, exclude_patterns) {
                    Ok(rules) => {
                        copy_tree(extracted, live, &rules, &mut report.failures);
                        report.executed += 1;
                    }
                    Err(e) => report.failures.push(Failure::new(pattern.clone(), &e)),
                },
                PlannedAction::MergeTree {
                    extracted, live, ..
                } => {
                    report.merge_pairs.push((extracted.clone(), live.clone()));
                    if let Some(tool) = self.merge_tool
                        && let Err(e) = tool.merge(extracted, live)
                    {
                        report
                            .failures
                            .push(Failure::new(live.display().to_string(), &e));
                    }
                    report.executed += 1;
                }
                PlannedAction::InstallPackage(name) => {
                    self.package_action(name, report, |m| m.install(name));
                }
                PlannedAction::MarkDependency(name) => {
                    self.package_action(name, report, |m| m.mark_dependency(name));
                }
                PlannedAction::PurgePackage(name) => {
                    self.package_action(name, report, |m| m.purge(name));
                }
                PlannedAction::SetConfig { key, value } => {
                    if let Some(store) = self.config_store {
                        match store.set(key, value) {
                            Ok(()) => report.executed += 1,
                            Err(e) => report.failures.push(Failure::new(key.clone(), &e)),
                        }
                    }
                }
            }
        }
    }

    fn package_action(
        &self,
        name: &str,
        report: &mut ApplyReport,
        f: impl FnOnce(&dyn PackageManager) -> Result<()>,
    ) {
        if let Some(manager) = self.package_manager {
            match f(manager) {
                Ok(()) => report.executed += 1,
                Err(e) => report.failures.push(Failure::new(name.to_string(), &e)),
            }
        }
    }
}

/// Extracts the whole archive into the scratch directory and reads its
/// manifest. Any failure here means the archive cannot be trusted, so the
/// restore aborts before touching the live system.
fn extract_archive(archive_path: &Path, scratch: &Path) -> Result<ArchiveManifest> {
    let file = File::open(archive_path).map_err(|e| {
        Error::ArchiveUnreadable(format!("{}: {e}", archive_path.display()))
    })?;

    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.unpack(scratch).map_err(|e| {
        Error::ArchiveUnreadable(format!("{}: {e}", archive_path.display()))
    })?;

    let manifest_path = scratch.join(MANIFEST_NAME);
    let manifest_json = fs::read_to_string(&manifest_path)
        .map_err(|e| Error::ArchiveUnreadable(format!("missing manifest: {e}")))?;
    ArchiveManifest::from_json(&manifest_json)
}

/// Copies an extracted tree over the live path, overwriting. Exclusions
/// are honored here too, so entries matching a rule are absent after
/// restore. Per-entry failures are recorded and the copy continues.
fn copy_tree(extracted: &Path, live: &Path, rules: &ExclusionRules, failures: &mut Vec<Failure>) {
    if let Some(parent) = live.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        failures.push(Failure::new(
            live.display().to_string(),
            &anyhow::Error::from(e),
        ));
        return;
    }

    let walker = WalkDir::new(extracted).follow_links(false).into_iter();
    for item in walker.filter_entry(|e| {
        let relative = e.path().strip_prefix(extracted).unwrap_or(e.path());
        !rules.excludes(&live.join(relative), relative)
    }) {
        let dir_entry = match item {
            Ok(dir_entry) => dir_entry,
            Err(e) => {
                let subject = e.path().map_or_else(
                    || extracted.display().to_string(),
                    |p| p.display().to_string(),
                );
                failures.push(Failure::new(subject, &anyhow::Error::from(e)));
                continue;
            }
        };

        let relative = dir_entry
            .path()
            .strip_prefix(extracted)
            .unwrap_or(dir_entry.path());
        let dest = live.join(relative);

        if let Err(e) = copy_entry(dir_entry.path(), &dest) {
            failures.push(Failure::new(dest.display().to_string(), &e));
        }
    }
}

fn copy_entry(source: &Path, dest: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(source).map_err(|e| Error::IoFailure {
        path: source.to_path_buf(),
        source: e,
    })?;
    let io = |e: std::io::Error| Error::IoFailure {
        path: dest.to_path_buf(),
        source: e,
    };

    if meta.file_type().is_dir() {
        // A non-directory in the way of a directory is a format
        // conflict; replace it
        if let Ok(existing) = fs::symlink_metadata(dest)
            && !existing.file_type().is_dir()
        {
            fs::remove_file(dest).map_err(io)?;
        }
        fs::create_dir_all(dest).map_err(io)?;
    } else if meta.file_type().is_symlink() {
        let target = fs::read_link(source).map_err(io)?;
        remove_existing(dest)?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, dest).map_err(io)?;
    } else {
        remove_existing(dest)?;
        fs::copy(source, dest).map_err(io)?;
    }

    Ok(())
}

fn remove_existing(dest: &Path) -> Result<()> {
    let io = |e: std::io::Error| Error::IoFailure {
        path: dest.to_path_buf(),
        source: e,
    };
    if let Ok(existing) = fs::symlink_metadata(dest) {
        if existing.file_type().is_dir() {
            fs::remove_dir_all(dest).map_err(io)?;
        } else {
            fs::remove_file(dest).map_err(io)?;
        }
    }
    Ok(())
}
