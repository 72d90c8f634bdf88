use super::{print_error, print_info, print_success, print_warning};
use crate::SysbackContext;
use crate::archive::restore::{RestoreEngine, RestoreOptions};
use crate::external::{AptPackageManager, GsettingsStore, MergeTool};
use anyhow::Result;

/// Restore the selected domains from the backup archive.
///
/// The archive is extracted and validated in full before any live
/// mutation. `dry_run` prints the computed plan and changes nothing.
///
/// # Errors
///
/// Fatal: unreadable archive, unresolved environment variable in a
/// tracked-path pattern. Per-entity failures are reported at the end and
/// do not abort the run.
pub fn execute(
    ctx: &SysbackContext,
    dry_run: bool,
    interactive: bool,
    files: bool,
    packages: bool,
    configurations: bool,
) -> Result<()> {
    // Reconcile first so unresolved entities can be decided before their
    // decisions are applied. Dry runs must not write the ledger.
    if !dry_run && (packages || configurations) {
        super::check::execute(ctx, packages, configurations)?;
    }

    let options = RestoreOptions {
        dry_run,
        interactive,
        files,
        packages,
        configurations,
    };

    let apt = AptPackageManager;
    let gsettings = GsettingsStore;
    let merge_tool = MergeTool::detect()?;

    let mut engine = RestoreEngine::new();
    if packages && AptPackageManager::is_available() {
        engine = engine.with_package_manager(&apt);
    }
    if configurations && GsettingsStore::is_available() {
        engine = engine.with_config_store(&gsettings);
    }
    if let Some(tool) = &merge_tool {
        engine = engine.with_merge_tool(tool);
    }

    let report = engine.run(&ctx.archive_path(), &options)?;

    if dry_run {
        print_info(&format!("planned actions ({}):", report.planned.len()));
        for action in &report.planned {
            println!("  {action}");
        }
        return Ok(());
    }

    // Without a configured merge tool the pairs are the operator's to
    // reconcile by hand
    if merge_tool.is_none() {
        for (extracted, live) in &report.merge_pairs {
            println!("[M] {} {}", extracted.display(), live.display());
        }
    }

    for failure in &report.failures {
        print_error(&format!("{}: {}", failure.subject, failure.error));
    }

    if report.failures.is_empty() {
        print_success(&format!("applied {} actions", report.executed));
    } else {
        print_warning(&format!(
            "applied {} actions with {} failures",
            report.executed,
            report.failures.len()
        ));
    }

    Ok(())
}
