use anyhow::Result;
use std::path::{Path, PathBuf};
use sysback::SysbackContext;
use tempfile::TempDir;

/// Test fixture: isolated conf/target directories plus a data directory
/// to back up.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub ctx: SysbackContext,
}

impl TestEnv {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let ctx = SysbackContext::new(
            Some(temp_dir.path().join("conf")),
            Some(temp_dir.path().join("target")),
        )?;
        Ok(Self { temp_dir, ctx })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Creates a small data tree and returns its root.
    pub fn make_data_tree(&self) -> Result<PathBuf> {
        let data = self.path().join("data");
        std::fs::create_dir_all(data.join("sub"))?;
        std::fs::write(data.join("alpha.txt"), "alpha")?;
        std::fs::write(data.join("sub/beta.txt"), "beta")?;
        Ok(data)
    }
}
