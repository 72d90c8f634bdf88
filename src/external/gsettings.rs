use super::{ConfigStore, run_collaborator};
use anyhow::Result;
use std::collections::BTreeMap;
use std::process::Command;

/// gsettings frontend. Keys are flattened to `schema.key`; values are the
/// GVariant text representations that `gsettings list-recursively` prints.
pub struct GsettingsStore;

impl GsettingsStore {
    /// Whether gsettings is present on this system.
    #[must_use]
    pub fn is_available() -> bool {
        which::which("gsettings").is_ok()
    }

    /// Splits a flattened key back into (schema, key).
    fn split_key(key: &str) -> Option<(&str, &str)> {
        key.rsplit_once('.')
    }
}

impl ConfigStore for GsettingsStore {
    fn name(&self) -> &str {
        "gsettings"
    }

    fn current(&self) -> Result<BTreeMap<String, String>> {
        let output = run_collaborator(Command::new("gsettings").arg("list-recursively"))?;

        let mut result = BTreeMap::new();
        for line in output.lines() {
            // Format: "<schema> <key> <value...>"
            let mut parts = line.trim().splitn(3, char::is_whitespace);
            let (Some(schema), Some(key), Some(value)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            result.insert(format!("{schema}.{key}"), value.trim().to_string());
        }

        Ok(result)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let Some((schema, leaf)) = Self::split_key(key) else {
            anyhow::bail!("malformed configuration key: {key}");
        };
        run_collaborator(Command::new("gsettings").args(["set", schema, leaf, value]))?;
        Ok(())
    }
}
