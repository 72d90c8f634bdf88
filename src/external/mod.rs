//! External collaborator interfaces.
//!
//! The engines never shell out directly; they consume these traits so a
//! non-interactive or test caller can substitute in-memory fakes. The
//! concrete implementations ([`apt`], [`gsettings`]) wrap the system
//! command-line tools.

/// apt package-manager collaborator
pub mod apt;
/// gsettings configuration-store collaborator
pub mod gsettings;
/// External merge-tool invocation for manual restores
pub mod mergetool;

pub use apt::AptPackageManager;
pub use gsettings::GsettingsStore;
pub use mergetool::MergeTool;

use crate::errors::Error;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::process::Command;

/// Installed-software collaborator: one query plus the three verbs the
/// apply engine needs.
pub trait PackageManager {
    /// Short name used in reports ("apt")
    fn name(&self) -> &str;

    /// The set of currently installed (manually selected) identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollaboratorFailure`] if the query command fails.
    fn installed(&self) -> Result<BTreeSet<String>>;

    /// Install a package.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollaboratorFailure`] on a non-zero exit.
    fn install(&self, package: &str) -> Result<()>;

    /// Mark an installed package as a dependency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollaboratorFailure`] on a non-zero exit.
    fn mark_dependency(&self, package: &str) -> Result<()>;

    /// Remove a package together with its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollaboratorFailure`] on a non-zero exit.
    fn purge(&self, package: &str) -> Result<()>;
}

/// Desktop configuration-store collaborator.
pub trait ConfigStore {
    /// Short name used in reports ("gsettings")
    fn name(&self) -> &str;

    /// Live values of every key the store exposes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollaboratorFailure`] if the dump command fails.
    fn current(&self) -> Result<BTreeMap<String, String>>;

    /// Write one key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollaboratorFailure`] on a non-zero exit.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Runs a command, mapping spawn failures and non-zero exits to
/// [`Error::CollaboratorFailure`] and returning captured stdout.
pub(crate) fn run_collaborator(command: &mut Command) -> Result<String> {
    let rendered = format!("{command:?}");
    tracing::debug!(command = %rendered, "running collaborator");

    let output = command
        .output()
        .map_err(|e| Error::CollaboratorFailure(format!("{rendered}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::CollaboratorFailure(format!(
            "{rendered}: exited with {}: {}",
            output.status,
            stderr.trim()
        ))
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
