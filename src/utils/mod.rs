//! Utility functions and helpers.
//!
//! - Environment-variable placeholder resolution for tracked-path patterns
//! - Path manipulation (tilde expansion, archive-relative paths)
//! - Binary serialization ([`serialization`])

/// Binary serialization utilities
pub mod serialization;

use crate::errors::Error;
use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Substitutes `$VAR` and `${VAR}` placeholders in a pattern.
///
/// Resolution is deferred on purpose: patterns are stored raw and resolved
/// fresh against the environment of each backup/restore invocation, so the
/// same settings relocate correctly across differing environments. `lookup`
/// supplies variable values; the first unresolvable variable fails the
/// whole pattern.
///
/// A literal `$` can be written as `$$`.
///
/// # Errors
///
/// Returns [`Error::UnresolvedVariable`] if `lookup` has no value for a
/// referenced variable.
pub fn substitute_variables<F>(pattern: &str, lookup: F) -> Result<String, Error>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some(&(_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some(&(_, '{')) => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed || name.is_empty() {
                    return Err(Error::UnresolvedVariable {
                        pattern: pattern.to_string(),
                        var: name,
                    });
                }
                match lookup(&name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        return Err(Error::UnresolvedVariable {
                            pattern: pattern.to_string(),
                            var: name,
                        });
                    }
                }
            }
            _ => {
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    // Bare `$` with no variable name, keep it literal
                    out.push('$');
                    continue;
                }
                match lookup(&name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        return Err(Error::UnresolvedVariable {
                            pattern: pattern.to_string(),
                            var: name,
                        });
                    }
                }
            }
        }
    }

    Ok(out)
}

/// Resolves a tracked-path pattern against the current process environment.
///
/// Applies [`substitute_variables`] with `std::env::var`, expands a leading
/// tilde, and makes the result absolute.
///
/// # Errors
///
/// Returns [`Error::UnresolvedVariable`] (through anyhow) for unset
/// variables, or an error if the path cannot be made absolute.
pub fn resolve_pattern(pattern: &str) -> Result<PathBuf> {
    let resolved = substitute_variables(pattern, |name| std::env::var(name).ok())?;
    let expanded = expand_tilde(Path::new(&resolved))?;
    make_absolute(&expanded)
}

/// Expands tilde in path to home directory
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    if let Some(path_str) = path.to_str() {
        if path_str.starts_with("~/") || path_str == "~" {
            let home = dirs::home_dir().context("Could not find home directory")?;
            if path_str == "~" {
                Ok(home)
            } else {
                Ok(home.join(&path_str[2..]))
            }
        } else {
            Ok(path.to_path_buf())
        }
    } else {
        Ok(path.to_path_buf())
    }
}

/// Makes a path absolute, resolving relative paths from current directory
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined
pub fn make_absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let current_dir = std::env::current_dir()?;
        Ok(current_dir.join(path))
    }
}

/// Strips the root component from an absolute path, yielding the layout
/// used for archive member names (`/home/u/.bashrc` -> `home/u/.bashrc`).
#[must_use]
pub fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect()
}

/// Formats an epoch-seconds timestamp for display in snapshot listings.
#[must_use]
pub fn format_timestamp(epoch: i64) -> String {
    chrono::DateTime::from_timestamp(epoch, 0)
        .map_or_else(|| epoch.to_string(), |dt| dt.to_rfc3339())
}
