use crate::errors::Error;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment variable naming the external merge tool for manual
/// restores.
pub const MERGE_TOOL_ENV: &str = "SYSBACK_MERGE_TOOL";

/// External visual diff/merge tool, invoked once per merge pair.
///
/// The restore engine blocks until the tool exits before moving to the
/// next pair; merges are never run in parallel.
pub struct MergeTool {
    program: PathBuf,
}

impl MergeTool {
    /// Detects the configured merge tool from `SYSBACK_MERGE_TOOL`.
    ///
    /// Returns `Ok(None)` when no tool is configured, which degrades
    /// manual restore to reporting pairs only.
    ///
    /// # Errors
    ///
    /// A tool that is configured but not on `$PATH` is an error rather
    /// than silent degradation.
    pub fn detect() -> Result<Option<Self>> {
        let Ok(name) = std::env::var(MERGE_TOOL_ENV) else {
            return Ok(None);
        };
        if name.is_empty() {
            return Ok(None);
        }

        let program = which::which(&name).map_err(|_| {
            anyhow::anyhow!(
                "{MERGE_TOOL_ENV}={name} is set but the `{name}` executable was not found in $PATH"
            )
        })?;

        Ok(Some(Self { program }))
    }

    #[must_use]
    pub fn from_program(program: PathBuf) -> Self {
        Self { program }
    }

    /// Invokes the tool with (extracted, live) and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollaboratorFailure`] if the tool cannot be
    /// spawned. A non-zero exit is not an error; many diff tools exit
    /// non-zero when the files differ.
    pub fn merge(&self, extracted: &Path, live: &Path) -> Result<()> {
        tracing::info!(
            tool = %self.program.display(),
            extracted = %extracted.display(),
            live = %live.display(),
            "invoking merge tool"
        );

        let status = Command::new(&self.program)
            .arg(extracted)
            .arg(live)
            .status()
            .map_err(|e| {
                Error::CollaboratorFailure(format!("{}: {e}", self.program.display()))
            })?;

        tracing::debug!(?status, "merge tool exited");
        Ok(())
    }
}
