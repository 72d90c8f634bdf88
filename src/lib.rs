//! # Sysback - Personal-Machine Backup/Restore Tool
//!
//! Sysback captures point-in-time filesystem index snapshots, computes
//! diffs between them, reconciles drift in installed packages and desktop
//! configuration keys against a persisted decision ledger, and applies
//! backup/restore transactions across all three domains using per-entity
//! strategies.
//!
//! ## Architecture
//!
//! - [`scanner`]: filesystem walking into timestamped snapshots
//! - [`storage`]: snapshot persistence and the decision ledger
//! - [`diff`]: snapshot-to-snapshot and changed-since-cutoff diffs
//! - [`reconcile`]: per-entity drift reconciliation state machine
//! - [`archive`]: backup archive construction and restore application
//! - [`external`]: package-manager/config-store/merge-tool collaborators
//! - [`settings`]: tracked paths, strategies, and exclusion rules
//! - [`commands`]: CLI command implementations

/// Backup archive construction and restore application.
pub mod archive;

/// Commands module containing all CLI command implementations.
pub mod commands;

/// Diff computation between snapshots or against a cutoff timestamp.
pub mod diff;

/// Error taxonomy shared across engines.
pub mod errors;

/// External collaborator traits and system implementations.
pub mod external;

/// Drift reconciliation against the decision ledger.
pub mod reconcile;

/// Filesystem scanning for snapshot capture.
pub mod scanner;

/// Operator settings: tracked paths, strategies, exclusions.
pub mod settings;

/// Snapshot, state, and ledger persistence.
pub mod storage;

/// Utility functions and helpers.
pub mod utils;

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Current version of the sysback binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the configuration directory.
pub const CONF_DIR_ENV: &str = "SYSBACK_CONF_DIR";

/// Default configuration directory name within the home directory.
pub const DEFAULT_CONF_DIR: &str = ".sysback";

/// Settings file name within the conf directory.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Decision-ledger state file name within the conf directory.
pub const STATE_FILE: &str = "state.bin";

/// Directory name for stored snapshots within the conf directory.
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Backup archive file name within the target directory.
pub const ARCHIVE_FILE: &str = "sysback-data.tar.gz";

/// Zstd level for snapshot compression.
pub const SNAPSHOT_COMPRESSION_LEVEL: i32 = 3;

/// Central context for all sysback operations: resolved directories plus
/// the loaded settings.
#[derive(Debug, Clone)]
pub struct SysbackContext {
    /// Configuration directory holding settings, state, and snapshots.
    pub conf_dir: PathBuf,

    /// Directory holding the backup archive.
    pub target_dir: PathBuf,

    /// Loaded operator settings.
    pub settings: settings::Settings,
}

impl SysbackContext {
    /// Creates a context from optional CLI overrides, falling back to
    /// `SYSBACK_CONF_DIR` and then `~/.sysback`; the target directory
    /// defaults to the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or
    /// settings cannot be loaded.
    pub fn new(conf_dir: Option<PathBuf>, target_dir: Option<PathBuf>) -> Result<Self> {
        let conf_dir = match conf_dir {
            Some(dir) => dir,
            None => match std::env::var(CONF_DIR_ENV) {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => dirs::home_dir()
                    .context("Could not find home directory")?
                    .join(DEFAULT_CONF_DIR),
            },
        };

        let target_dir = match target_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("Could not determine current directory")?,
        };

        let settings = settings::Settings::load(&conf_dir.join(SETTINGS_FILE))?;

        Ok(Self {
            conf_dir,
            target_dir,
            settings,
        })
    }

    /// Path of the settings file.
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.conf_dir.join(SETTINGS_FILE)
    }

    /// Path of the decision-ledger state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.conf_dir.join(STATE_FILE)
    }

    /// Path of the backup archive.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.target_dir.join(ARCHIVE_FILE)
    }

    /// Snapshot store rooted in the conf directory.
    #[must_use]
    pub fn snapshot_store(&self) -> storage::snapshots::SnapshotStore {
        storage::snapshots::SnapshotStore::new(
            self.conf_dir.join(SNAPSHOTS_DIR),
            SNAPSHOT_COMPRESSION_LEVEL,
        )
    }

    /// Writes the in-memory settings back to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be written.
    pub fn save_settings(&self) -> Result<()> {
        self.settings.save(&self.settings_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_paths() {
        let temp = TempDir::new().unwrap();
        let ctx = SysbackContext::new(
            Some(temp.path().join("conf")),
            Some(temp.path().join("target")),
        )
        .unwrap();

        assert_eq!(ctx.settings_path(), temp.path().join("conf/settings.toml"));
        assert_eq!(ctx.state_path(), temp.path().join("conf/state.bin"));
        assert_eq!(
            ctx.archive_path(),
            temp.path().join("target").join(ARCHIVE_FILE)
        );
    }

    #[test]
    fn test_context_creates_default_settings() {
        let temp = TempDir::new().unwrap();
        let ctx = SysbackContext::new(Some(temp.path().to_path_buf()), None).unwrap();

        assert!(ctx.settings.tracked_paths.is_empty());
        assert!(temp.path().join(SETTINGS_FILE).exists());
    }
}
