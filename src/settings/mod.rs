use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Restore-time handling for a tracked path.
///
/// All three strategies are included in the archive at backup time; the
/// strategy only changes what happens on restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Copy extracted content over the live path, overwriting
    #[default]
    Auto,
    /// Archived but never written back to the live filesystem
    BackupOnly,
    /// Reported as a merge pair; external merge tool if configured
    Manual,
}

/// A configured filesystem location to back up.
///
/// `pattern` may embed `$VAR`/`${VAR}` placeholders; it is stored raw and
/// resolved against the process environment at each backup/restore, never
/// at definition time. Exclusions apply only under this tracked path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPath {
    pub pattern: String,
    #[serde(default)]
    pub strategy: Strategy,
    /// Literal path prefixes dropped from the walk
    #[serde(default)]
    pub exclude_subpaths: Vec<PathBuf>,
    /// Regexes tested against the path relative to the resolved root
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl TrackedPath {
    #[must_use]
    pub fn new(pattern: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            pattern: pattern.into(),
            strategy,
            exclude_subpaths: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Snapshot-scanner exclusions. These are global, unlike tracked-path
/// exclusions which are scoped to their owning path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default)]
    pub exclude_paths: Vec<PathBuf>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// Operator-edited settings, stored as TOML in the conf directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub tracked_paths: Vec<TrackedPath>,

    #[serde(default)]
    pub scan: ScanSettings,
}

impl Settings {
    /// Load settings from a file, creating a default file if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid
    /// TOML.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let settings = Self::default();
            settings.save(path)?;
            return Ok(settings);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid settings file: {}", path.display()))
    }

    /// Save settings to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))
    }

    /// Looks up a tracked path by its raw pattern.
    #[must_use]
    pub fn tracked_path(&self, pattern: &str) -> Option<&TrackedPath> {
        self.tracked_paths.iter().find(|tp| tp.pattern == pattern)
    }

    /// Looks up a tracked path by its raw pattern, mutably.
    pub fn tracked_path_mut(&mut self, pattern: &str) -> Option<&mut TrackedPath> {
        self.tracked_paths
            .iter_mut()
            .find(|tp| tp.pattern == pattern)
    }

    /// Adds or replaces a tracked path, keeping the list sorted by
    /// pattern so engines process paths in a stable order.
    pub fn set_tracked_path(&mut self, tracked: TrackedPath) {
        self.tracked_paths.retain(|tp| tp.pattern != tracked.pattern);
        self.tracked_paths.push(tracked);
        self.tracked_paths.sort_by(|a, b| a.pattern.cmp(&b.pattern));
    }

    /// Removes a tracked path; returns whether anything was removed.
    pub fn remove_tracked_path(&mut self, pattern: &str) -> bool {
        let before = self.tracked_paths.len();
        self.tracked_paths.retain(|tp| tp.pattern != pattern);
        self.tracked_paths.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_creates_default() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.toml");

        let settings = Settings::load(&path)?;
        assert!(path.exists());
        assert!(settings.tracked_paths.is_empty());
        Ok(())
    }

    #[test]
    fn test_roundtrip_with_tracked_paths() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.toml");

        let mut settings = Settings::default();
        let mut tp = TrackedPath::new("$HOME/.config/app", Strategy::Manual);
        tp.exclude_subpaths.push(PathBuf::from("/home/u/.config/app/cache"));
        tp.exclude_patterns.push(r"\.log$".to_string());
        settings.set_tracked_path(tp);
        settings
            .scan
            .exclude_patterns
            .push(r"/\.cache/".to_string());
        settings.save(&path)?;

        let loaded = Settings::load(&path)?;
        let tp = loaded.tracked_path("$HOME/.config/app").unwrap();
        assert_eq!(tp.strategy, Strategy::Manual);
        assert_eq!(tp.exclude_patterns, vec![r"\.log$".to_string()]);
        assert_eq!(loaded.scan.exclude_patterns.len(), 1);
        Ok(())
    }

    #[test]
    fn test_set_tracked_path_replaces_and_sorts() {
        let mut settings = Settings::default();
        settings.set_tracked_path(TrackedPath::new("/b", Strategy::Auto));
        settings.set_tracked_path(TrackedPath::new("/a", Strategy::Auto));
        settings.set_tracked_path(TrackedPath::new("/b", Strategy::Manual));

        let patterns: Vec<_> = settings
            .tracked_paths
            .iter()
            .map(|tp| tp.pattern.as_str())
            .collect();
        assert_eq!(patterns, vec!["/a", "/b"]);
        assert_eq!(settings.tracked_path("/b").unwrap().strategy, Strategy::Manual);
    }

    #[test]
    fn test_remove_tracked_path() {
        let mut settings = Settings::default();
        settings.set_tracked_path(TrackedPath::new("/a", Strategy::Auto));
        assert!(settings.remove_tracked_path("/a"));
        assert!(!settings.remove_tracked_path("/a"));
    }
}
