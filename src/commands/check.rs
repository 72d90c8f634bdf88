use super::{print_info, print_success, print_warning};
use crate::SysbackContext;
use crate::external::{AptPackageManager, GsettingsStore};
use crate::reconcile::{
    ConfigChoice, ConfigDrift, DecisionProvider, PackageChoice, PackageDrift, ReconcileReport,
    Reconciler, SkipAll,
};
use crate::storage::state::State;
use anyhow::Result;
use std::io::{BufRead, IsTerminal, Write};

/// Reconcile live package/configuration state against the decision
/// ledger, prompting for every unresolved entity.
///
/// Without a terminal on stdin every entity is skipped, leaving it
/// eligible for the next run; automation can resolve entities through the
/// library interface instead.
///
/// # Errors
///
/// Returns an error if live state cannot be queried or the ledger cannot
/// be written.
pub fn execute(ctx: &SysbackContext, packages: bool, configurations: bool) -> Result<()> {
    let state_path = ctx.state_path();
    let mut state = State::load(&state_path)?;
    let mut reconciler = Reconciler::new(&mut state, &state_path);

    let interactive = std::io::stdin().is_terminal();
    let mut console = ConsoleProvider;
    let mut skip_all = SkipAll;
    let provider: &mut dyn DecisionProvider = if interactive {
        &mut console
    } else {
        &mut skip_all
    };

    let mut no_change = true;

    // Package domain first, then configs; within a domain the engine
    // surfaces identifiers in lexical order
    if packages {
        if AptPackageManager::is_available() {
            let report = reconciler.check_packages(&AptPackageManager, provider)?;
            summarize(&report, &mut no_change);
        } else {
            print_warning("apt is not available, skipping package check");
        }
    }

    if configurations {
        if GsettingsStore::is_available() {
            let report = reconciler.check_configs(&GsettingsStore, provider)?;
            summarize(&report, &mut no_change);
        } else {
            print_warning("gsettings is not available, skipping configuration check");
        }
    }

    if no_change {
        print_info("No changes detected.");
    } else {
        print_success("Done.");
    }
    Ok(())
}

fn summarize(report: &ReconcileReport, no_change: &mut bool) {
    for note in &report.notes {
        println!("{note}");
    }
    if !report.no_change() {
        *no_change = false;
    }
    if report.skipped > 0 {
        print_info(&format!(
            "{} entities left unresolved for the next run",
            report.skipped
        ));
    }
}

/// Interactive decision provider reading single-letter answers from
/// stdin, in the spirit of `git add -p`. An empty answer skips.
struct ConsoleProvider;

impl ConsoleProvider {
    fn ask(prompt: &str, accepted: &[char]) -> Result<char> {
        let stdin = std::io::stdin();
        loop {
            print!("{prompt} ");
            std::io::stdout().flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF behaves like skip
                return Ok('s');
            }
            let answer = line.trim().to_lowercase();
            if answer.is_empty() {
                return Ok('s');
            }
            if let Some(c) = answer.chars().next()
                && answer.len() == 1
                && accepted.contains(&c)
            {
                return Ok(c);
            }
        }
    }
}

impl DecisionProvider for ConsoleProvider {
    fn decide_package(&mut self, drift: &PackageDrift) -> Result<PackageChoice> {
        let status = if drift.installed {
            "installed"
        } else {
            "no longer installed"
        };
        println!("{} is detected ({status})", drift.name);
        println!("d: mark as dependency, i: ignore, r: remove, t: track, S: skip");

        let choice = match Self::ask("[d/i/r/t/S]", &['d', 'i', 'r', 't', 's'])? {
            'd' => PackageChoice::Dependency,
            'i' => PackageChoice::Ignore,
            'r' => PackageChoice::Remove,
            't' => PackageChoice::Track,
            _ => PackageChoice::Skip,
        };
        println!();
        Ok(choice)
    }

    fn decide_config(&mut self, drift: &ConfigDrift) -> Result<ConfigChoice> {
        println!("{}", drift.key);
        println!("<{}", drift.previous.as_deref().unwrap_or("(unset)"));
        println!(">{}", drift.current.as_deref().unwrap_or("(unset)"));
        println!("i: ignore, t: track, S: skip");

        let choice = match Self::ask("[i/t/S]", &['i', 't', 's'])? {
            'i' => ConfigChoice::Ignore,
            't' => ConfigChoice::Track,
            _ => ConfigChoice::Skip,
        };
        println!();
        Ok(choice)
    }
}
