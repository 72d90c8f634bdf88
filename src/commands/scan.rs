use super::{print_info, print_success, print_warning};
use crate::SysbackContext;
use crate::scanner::Scanner;
use crate::utils::format_timestamp;
use anyhow::Result;
use std::path::PathBuf;

/// Scan the given roots (the filesystem root when none are given) and
/// persist a new snapshot keyed by the capture time.
///
/// # Errors
///
/// Returns an error if the scan cannot start or the snapshot cannot be
/// saved; per-entry problems become snapshot warnings.
pub fn execute(ctx: &SysbackContext, paths: &[String]) -> Result<()> {
    let roots: Vec<PathBuf> = if paths.is_empty() {
        vec![PathBuf::from("/")]
    } else {
        paths.iter().map(PathBuf::from).collect()
    };

    let scanner = Scanner::from_settings(&ctx.settings.scan)?;
    let timestamp = chrono::Utc::now().timestamp();
    let snapshot = scanner.scan(&roots, timestamp)?;

    for warning in &snapshot.warnings {
        print_warning(warning);
    }

    let key = ctx.snapshot_store().save(&snapshot)?;
    print_success(&format!(
        "snapshot {key} saved ({} entries, {} warnings)",
        snapshot.entries.len(),
        snapshot.warnings.len()
    ));
    Ok(())
}

/// List stored snapshot keys, ascending.
///
/// # Errors
///
/// Returns an error if the snapshot directory cannot be read.
pub fn list(ctx: &SysbackContext) -> Result<()> {
    let keys = ctx.snapshot_store().list_keys()?;
    if keys.is_empty() {
        print_info("No snapshots exist yet. Run the scan command first.");
        return Ok(());
    }

    for key in keys {
        println!("{key} ({})", format_timestamp(key));
    }
    Ok(())
}

/// Remove one snapshot. Pruning is always operator-initiated.
///
/// # Errors
///
/// Returns an error if the key does not exist or the file cannot be
/// removed.
pub fn remove(ctx: &SysbackContext, key: i64) -> Result<()> {
    ctx.snapshot_store().remove(key)?;
    print_success(&format!("snapshot {key} removed"));
    Ok(())
}
