use super::{print_error, print_info, print_success, print_warning};
use crate::SysbackContext;
use crate::archive::backup::BackupEngine;
use crate::external::{AptPackageManager, ConfigStore, GsettingsStore, PackageManager};
use crate::storage::state::State;
use anyhow::Result;

/// Run a backup across the selected domains.
///
/// Package and configuration scans refresh the baseline the next `check`
/// diffs against; the file pass writes the archive. Without `force` an
/// archive whose contents are unchanged since the previous run is left
/// in place.
///
/// # Errors
///
/// Returns an error on archive-wide failures; per-path problems are
/// reported and the run continues.
pub fn execute(
    ctx: &SysbackContext,
    force: bool,
    files: bool,
    packages: bool,
    configurations: bool,
) -> Result<()> {
    let state_path = ctx.state_path();
    let mut state = State::load(&state_path)?;

    if packages {
        if AptPackageManager::is_available() {
            state.scanned_packages = AptPackageManager.installed()?;
            print_info(&format!(
                "recorded {} installed packages",
                state.scanned_packages.len()
            ));
        } else {
            print_warning("apt is not available, skipping package scan");
        }
    }

    if configurations {
        if GsettingsStore::is_available() {
            state.scanned_configs = GsettingsStore.current()?;
            print_info(&format!(
                "recorded {} configuration keys",
                state.scanned_configs.len()
            ));
        } else {
            print_warning("gsettings is not available, skipping configuration scan");
        }
    }

    state.save(&state_path)?;

    if files {
        let archive_path = ctx.archive_path();
        let report =
            BackupEngine::new(&ctx.settings, &mut state, &state_path).run(&archive_path, force)?;

        for failure in &report.failures {
            print_error(&format!("{}: {}", failure.subject, failure.error));
        }

        if report.skipped_unchanged {
            print_info("archive is up to date");
        } else {
            print_success(&format!(
                "archived {} entries to {}",
                report.entries,
                report.archive_path.display()
            ));
        }

        if !report.failures.is_empty() {
            print_warning(&format!(
                "backup completed with {} failures",
                report.failures.len()
            ));
        }
    }

    Ok(())
}
