use super::{PackageManager, run_collaborator};
use anyhow::Result;
use std::collections::BTreeSet;
use std::process::Command;

/// apt frontend. Queries the manually-installed set through
/// `apt-mark showmanual`, which keeps dependency-marked packages out of
/// the drift surface.
pub struct AptPackageManager;

impl AptPackageManager {
    /// Whether apt is present on this system.
    #[must_use]
    pub fn is_available() -> bool {
        which::which("apt").is_ok()
    }
}

impl PackageManager for AptPackageManager {
    fn name(&self) -> &str {
        "apt"
    }

    fn installed(&self) -> Result<BTreeSet<String>> {
        let output = run_collaborator(Command::new("apt-mark").arg("showmanual"))?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    fn install(&self, package: &str) -> Result<()> {
        run_collaborator(
            Command::new("apt")
                .args(["install", "-y", package])
                .env("DEBIAN_FRONTEND", "noninteractive"),
        )?;
        Ok(())
    }

    fn mark_dependency(&self, package: &str) -> Result<()> {
        run_collaborator(Command::new("apt-mark").args(["auto", package]))?;
        Ok(())
    }

    fn purge(&self, package: &str) -> Result<()> {
        run_collaborator(
            Command::new("apt")
                .args(["purge", "-y", package])
                .env("DEBIAN_FRONTEND", "noninteractive"),
        )?;
        Ok(())
    }
}
