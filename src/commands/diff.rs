use super::print_info;
use crate::SysbackContext;
use crate::diff::DiffEngine;
use crate::utils::make_absolute;
use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Compute and print a diff between two snapshots, or against a bare
/// cutoff time.
///
/// # Errors
///
/// Propagates `NotFound` for explicit missing keys and
/// `InsufficientSnapshots` when defaults cannot be resolved.
pub fn execute(
    ctx: &SysbackContext,
    from_time: Option<i64>,
    to_time: Option<i64>,
    paths: &[String],
) -> Result<()> {
    let filter: Vec<PathBuf> = paths
        .iter()
        .map(|p| make_absolute(&PathBuf::from(p)))
        .collect::<Result<_>>()?;

    let store = ctx.snapshot_store();
    let result = DiffEngine::new(&store).diff(from_time, to_time, &filter)?;

    if result.is_empty() {
        print_info("No differences found");
        return Ok(());
    }

    // One sorted listing with A/D/M markers
    let mut lines = BTreeMap::new();
    for path in &result.added {
        lines.insert(path.clone(), "A".green());
    }
    for path in &result.removed {
        lines.insert(path.clone(), "D".red());
    }
    for path in &result.modified {
        lines.insert(path.clone(), "M".yellow());
    }

    for (path, marker) in lines {
        println!("{marker} {}", path.display());
    }
    Ok(())
}
