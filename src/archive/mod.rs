//! Backup archive construction and restore application.
//!
//! The archive is a gzip-compressed tar container: path entries laid out
//! under their resolved absolute path with the root stripped
//! (`/home/u/.bashrc` -> `home/u/.bashrc`), plus a JSON manifest entry
//! recording the tracked-path definitions and the package/config
//! decisions the restore side applies.

/// Archive construction from tracked paths
pub mod backup;
/// Archive extraction and apply engine
pub mod restore;

use crate::errors::Error;
use crate::settings::{Strategy, TrackedPath};
use crate::storage::state::{ConfigDecision, PackageDecision, State};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the manifest entry at the archive root.
pub const MANIFEST_NAME: &str = "sysback-manifest.json";

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// One tracked path as recorded in the archive.
///
/// The raw pattern is stored, never the resolved path: restore resolves
/// it fresh against its own environment, so a changed variable relocates
/// the target. `archive_root` pins where this path's entries landed in
/// the archive at backup time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPath {
    pub pattern: String,
    pub strategy: Strategy,
    #[serde(default)]
    pub exclude_subpaths: Vec<PathBuf>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Archive-relative location of the resolved root; `None` when the
    /// path could not be archived (missing source, unresolved variable)
    pub archive_root: Option<PathBuf>,
}

/// Metadata record embedded in the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub version: u32,
    /// Creation time, epoch seconds
    pub created: i64,
    pub paths: Vec<ManifestPath>,
    /// Persisted package decisions the restore side acts on; `ignore`
    /// entities are omitted because they are never acted on
    pub package_decisions: BTreeMap<String, PackageDecision>,
    /// Tracked configuration keys with their recorded values
    pub config_values: BTreeMap<String, String>,
}

impl ArchiveManifest {
    /// Builds the manifest skeleton from the decision ledger. Path
    /// entries are filled in by the backup engine as it resolves them.
    #[must_use]
    pub fn from_state(state: &State, created: i64) -> Self {
        let package_decisions = state
            .package_decisions
            .iter()
            .filter(|(_, d)| **d != PackageDecision::Ignore)
            .map(|(k, d)| (k.clone(), *d))
            .collect();

        let config_values = state
            .config_decisions
            .iter()
            .filter(|(_, r)| r.decision == ConfigDecision::Track)
            .filter_map(|(k, r)| r.recorded_value.clone().map(|v| (k.clone(), v)))
            .collect();

        Self {
            version: MANIFEST_VERSION,
            created,
            paths: Vec::new(),
            package_decisions,
            config_values,
        }
    }

    /// Serializes to pretty JSON for the archive entry.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize archive manifest")
    }

    /// Parses a manifest read back out of an archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArchiveUnreadable`] on malformed JSON.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data)
            .map_err(|e| Error::ArchiveUnreadable(format!("invalid manifest: {e}")).into())
    }
}

/// Compiled exclusion rules for one tracked path.
///
/// Subpaths are literal prefixes matched against the entry's resolved
/// absolute path; patterns are regexes matched against the path relative
/// to the resolved root. Rules never leak across tracked paths.
pub struct ExclusionRules {
    subpaths: Vec<PathBuf>,
    patterns: Vec<Regex>,
}

impl ExclusionRules {
    /// Compiles the rules of a tracked path.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid regex.
    pub fn compile(exclude_subpaths: &[PathBuf], exclude_patterns: &[String]) -> Result<Self> {
        let patterns = exclude_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid exclude pattern: {p}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            subpaths: exclude_subpaths.to_vec(),
            patterns,
        })
    }

    /// Convenience wrapper for settings entries.
    ///
    /// # Errors
    ///
    /// Same as [`ExclusionRules::compile`].
    pub fn for_tracked_path(tracked: &TrackedPath) -> Result<Self> {
        Self::compile(&tracked.exclude_subpaths, &tracked.exclude_patterns)
    }

    /// Whether an entry is dropped. `absolute` is the entry's resolved
    /// path, `relative` its path under the resolved root.
    #[must_use]
    pub fn excludes(&self, absolute: &Path, relative: &Path) -> bool {
        if self.subpaths.iter().any(|p| absolute.starts_with(p)) {
            return true;
        }

        let text = relative.to_string_lossy();
        self.patterns.iter().any(|p| p.is_match(&text))
    }
}

/// One recorded per-entity failure. Operations collect these and report
/// partial success instead of aborting.
#[derive(Debug, Clone)]
pub struct Failure {
    /// Path or entity identifier
    pub subject: String,
    pub error: String,
}

impl Failure {
    pub fn new(subject: impl Into<String>, error: &anyhow::Error) -> Self {
        Self {
            subject: subject.into(),
            error: format!("{error:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::state::ConfigRecord;

    #[test]
    fn test_manifest_omits_ignored_packages() {
        let mut state = State::default();
        state
            .package_decisions
            .insert("keep".to_string(), PackageDecision::Track);
        state
            .package_decisions
            .insert("noise".to_string(), PackageDecision::Ignore);
        state
            .package_decisions
            .insert("old".to_string(), PackageDecision::Remove);

        let manifest = ArchiveManifest::from_state(&state, 1000);
        assert_eq!(manifest.package_decisions.len(), 2);
        assert!(!manifest.package_decisions.contains_key("noise"));
    }

    #[test]
    fn test_manifest_tracks_config_values() {
        let mut state = State::default();
        state.config_decisions.insert(
            "a.b".to_string(),
            ConfigRecord {
                decision: ConfigDecision::Track,
                recorded_value: Some("v".to_string()),
            },
        );
        state.config_decisions.insert(
            "a.ignored".to_string(),
            ConfigRecord {
                decision: ConfigDecision::Ignore,
                recorded_value: None,
            },
        );

        let manifest = ArchiveManifest::from_state(&state, 1000);
        assert_eq!(
            manifest.config_values,
            BTreeMap::from([("a.b".to_string(), "v".to_string())])
        );
    }

    #[test]
    fn test_manifest_json_roundtrip() -> Result<()> {
        let mut manifest = ArchiveManifest::from_state(&State::default(), 1234);
        manifest.paths.push(ManifestPath {
            pattern: "$HOME/.bashrc".to_string(),
            strategy: Strategy::Auto,
            exclude_subpaths: vec![],
            exclude_patterns: vec![],
            archive_root: Some(PathBuf::from("home/u/.bashrc")),
        });

        let parsed = ArchiveManifest::from_json(&manifest.to_json()?)?;
        assert_eq!(parsed.created, 1234);
        assert_eq!(parsed.paths.len(), 1);
        assert_eq!(parsed.paths[0].pattern, "$HOME/.bashrc");
        Ok(())
    }

    #[test]
    fn test_invalid_manifest_is_archive_unreadable() {
        let err = ArchiveManifest::from_json("not json").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::ArchiveUnreadable(_))
        ));
    }

    #[test]
    fn test_exclusion_subpath_prefix() {
        let rules =
            ExclusionRules::compile(&[PathBuf::from("/home/u/app/cache")], &[]).unwrap();
        assert!(rules.excludes(
            Path::new("/home/u/app/cache/x"),
            Path::new("cache/x")
        ));
        assert!(!rules.excludes(Path::new("/home/u/app/data"), Path::new("data")));
    }

    #[test]
    fn test_exclusion_pattern_is_relative() {
        let rules = ExclusionRules::compile(&[], &[r"^logs/".to_string()]).unwrap();
        assert!(rules.excludes(Path::new("/any/where/logs/a"), Path::new("logs/a")));
        // The absolute path containing "logs" elsewhere does not match
        assert!(!rules.excludes(Path::new("/logs/elsewhere"), Path::new("elsewhere")));
    }
}
