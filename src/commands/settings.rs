use super::print_success;
use crate::SysbackContext;
use crate::settings::{Strategy, TrackedPath};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Add (or replace) a tracked path with the given restore strategy.
///
/// # Errors
///
/// Returns an error if settings cannot be saved.
pub fn add_tracked_path(ctx: &mut SysbackContext, path: &str, strategy: Strategy) -> Result<()> {
    ctx.settings
        .set_tracked_path(TrackedPath::new(path, strategy));
    ctx.save_settings()?;
    print_success(&format!("tracking {path}"));
    Ok(())
}

/// Remove a tracked path.
///
/// # Errors
///
/// Returns an error if the path is not tracked or settings cannot be
/// saved.
pub fn remove_tracked_path(ctx: &mut SysbackContext, path: &str) -> Result<()> {
    if !ctx.settings.remove_tracked_path(path) {
        anyhow::bail!("{path} is not tracked");
    }
    ctx.save_settings()?;
    print_success(&format!("no longer tracking {path}"));
    Ok(())
}

fn tracked_path_mut<'a>(
    ctx: &'a mut SysbackContext,
    path: &str,
) -> Result<&'a mut TrackedPath> {
    ctx.settings
        .tracked_path_mut(path)
        .with_context(|| format!("{path} is not tracked"))
}

/// Add an exclude subpath (literal prefix) to a tracked path.
///
/// # Errors
///
/// Returns an error if the path is not tracked or settings cannot be
/// saved.
pub fn add_exclude_subpath(
    ctx: &mut SysbackContext,
    path: &str,
    subpath: PathBuf,
) -> Result<()> {
    let tracked = tracked_path_mut(ctx, path)?;
    if !tracked.exclude_subpaths.contains(&subpath) {
        tracked.exclude_subpaths.push(subpath);
        tracked.exclude_subpaths.sort();
    }
    ctx.save_settings()?;
    print_success("exclude subpath added");
    Ok(())
}

/// Remove an exclude subpath from a tracked path.
///
/// # Errors
///
/// Returns an error if the path is not tracked or settings cannot be
/// saved.
pub fn remove_exclude_subpath(
    ctx: &mut SysbackContext,
    path: &str,
    subpath: &std::path::Path,
) -> Result<()> {
    let tracked = tracked_path_mut(ctx, path)?;
    tracked.exclude_subpaths.retain(|p| p.as_path() != subpath);
    ctx.save_settings()?;
    print_success("exclude subpath removed");
    Ok(())
}

/// Add an exclude regex to a tracked path. The pattern is validated
/// before it is stored.
///
/// # Errors
///
/// Returns an error if the regex is invalid, the path is not tracked, or
/// settings cannot be saved.
pub fn add_exclude_pattern(ctx: &mut SysbackContext, path: &str, pattern: &str) -> Result<()> {
    regex::Regex::new(pattern).with_context(|| format!("Invalid exclude pattern: {pattern}"))?;

    let tracked = tracked_path_mut(ctx, path)?;
    if !tracked.exclude_patterns.iter().any(|p| p == pattern) {
        tracked.exclude_patterns.push(pattern.to_string());
        tracked.exclude_patterns.sort();
    }
    ctx.save_settings()?;
    print_success("exclude pattern added");
    Ok(())
}

/// Remove an exclude regex from a tracked path.
///
/// # Errors
///
/// Returns an error if the path is not tracked or settings cannot be
/// saved.
pub fn remove_exclude_pattern(ctx: &mut SysbackContext, path: &str, pattern: &str) -> Result<()> {
    let tracked = tracked_path_mut(ctx, path)?;
    tracked.exclude_patterns.retain(|p| p != pattern);
    ctx.save_settings()?;
    print_success("exclude pattern removed");
    Ok(())
}

/// Add a global scan exclude path.
///
/// # Errors
///
/// Returns an error if settings cannot be saved.
pub fn add_scan_exclude_path(ctx: &mut SysbackContext, path: PathBuf) -> Result<()> {
    if !ctx.settings.scan.exclude_paths.contains(&path) {
        ctx.settings.scan.exclude_paths.push(path);
        ctx.settings.scan.exclude_paths.sort();
    }
    ctx.save_settings()?;
    print_success("scan exclude path added");
    Ok(())
}

/// Remove a global scan exclude path.
///
/// # Errors
///
/// Returns an error if settings cannot be saved.
pub fn remove_scan_exclude_path(ctx: &mut SysbackContext, path: &std::path::Path) -> Result<()> {
    ctx.settings.scan.exclude_paths.retain(|p| p.as_path() != path);
    ctx.save_settings()?;
    print_success("scan exclude path removed");
    Ok(())
}

/// Add a global scan exclude regex, validated before storing.
///
/// # Errors
///
/// Returns an error if the regex is invalid or settings cannot be saved.
pub fn add_scan_exclude_pattern(ctx: &mut SysbackContext, pattern: &str) -> Result<()> {
    regex::Regex::new(pattern).with_context(|| format!("Invalid exclude pattern: {pattern}"))?;

    if !ctx.settings.scan.exclude_patterns.iter().any(|p| p == pattern) {
        ctx.settings.scan.exclude_patterns.push(pattern.to_string());
        ctx.settings.scan.exclude_patterns.sort();
    }
    ctx.save_settings()?;
    print_success("scan exclude pattern added");
    Ok(())
}

/// Remove a global scan exclude regex.
///
/// # Errors
///
/// Returns an error if settings cannot be saved.
pub fn remove_scan_exclude_pattern(ctx: &mut SysbackContext, pattern: &str) -> Result<()> {
    ctx.settings.scan.exclude_patterns.retain(|p| p != pattern);
    ctx.save_settings()?;
    print_success("scan exclude pattern removed");
    Ok(())
}
