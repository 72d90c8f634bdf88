use crate::utils::serialization;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Terminal decision for a tracked package.
///
/// `unresolved` is deliberately absent: it is a derived, in-memory status
/// ("present in drift, no decision yet") and is never written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageDecision {
    /// Keep installed but mark as a dependency of something else
    Dependency,
    /// Recorded so it is never surfaced again; never acted on
    Ignore,
    /// Purge on restore
    Remove,
    /// Install on restore if missing
    Track,
}

/// Terminal decision for a tracked configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigDecision {
    Ignore,
    Track,
}

/// Persisted decision for one configuration key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub decision: ConfigDecision,
    /// Live value captured at the moment `track` was chosen. Value drift
    /// against this re-surfaces the key for re-approval.
    pub recorded_value: Option<String>,
}

/// The decision ledger plus the live-state baseline captured at backup
/// time.
///
/// Loaded at the start of every reconciliation run and written back after
/// each resolved (non-skip) decision. Entities resolved to `ignore` or
/// `remove` stay recorded indefinitely so they are not re-surfaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    /// Package name -> decision
    pub package_decisions: BTreeMap<String, PackageDecision>,
    /// Config key -> decision and recorded value
    pub config_decisions: BTreeMap<String, ConfigRecord>,
    /// Installed package set at the last backup scan
    pub scanned_packages: BTreeSet<String>,
    /// Live configuration dump at the last backup scan
    pub scanned_configs: BTreeMap<String, String>,
    /// Entry stamps from the last archive build, used to skip rebuilding
    /// an unchanged archive
    pub archive_stamps: BTreeMap<String, EntryStamp>,
}

/// Compact change stamp for one archived entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStamp {
    pub size: u64,
    pub modified: i64,
    pub mode: u32,
}

impl State {
    /// Loads the state ledger, returning an empty ledger if the file does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or deserialized.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        serialization::deserialize(&data).context("Failed to deserialize state")
    }

    /// Writes the ledger back to disk.
    ///
    /// # Errors
    ///
    /// Fails if the parent directory cannot be created or the file cannot
    /// be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serialization::serialize(self).context("Failed to serialize state")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, &data)
            .with_context(|| format!("Failed to write state file: {}", path.display()))
    }
}
