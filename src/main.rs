use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Generator, Shell, generate};
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::process;
use sysback::settings::Strategy;
use sysback::{SysbackContext, commands};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sysback",
    version = sysback::VERSION,
    about = "Point-in-time backup/restore tool for personal machines",
    long_about = "Backs up and restores files, installed packages, and desktop \
                  configuration keys using per-entity persisted strategies"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory (settings, state, snapshots)
    #[arg(short, long, global = true, env = sysback::CONF_DIR_ENV)]
    conf_dir: Option<PathBuf>,

    /// Directory holding the backup archive
    #[arg(short, long, global = true)]
    target_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the filesystem into a timestamped index snapshot
    Scan {
        /// Roots to scan; defaults to the filesystem root
        paths: Vec<String>,

        /// List stored snapshots and return
        #[arg(short, long, conflicts_with = "remove")]
        list: bool,

        /// Remove a snapshot and return
        #[arg(long, value_name = "SNAPSHOT")]
        remove: Option<i64>,
    },

    /// Show changes between snapshots, or since a cutoff time
    Diff {
        /// Baseline time in epoch seconds; defaults to the second-latest
        /// snapshot. A time with no matching snapshot acts as a cutoff
        #[arg(short, long)]
        from_time: Option<i64>,

        /// Target snapshot time; defaults to the latest snapshot
        #[arg(long)]
        to_time: Option<i64>,

        /// List stored snapshots and return
        #[arg(short, long)]
        list: bool,

        /// Restrict the diff to entries under these paths
        paths: Vec<String>,
    },

    /// Reconcile installed packages and configuration keys against the
    /// decision ledger
    Check {
        /// Check all domains; the default when none is selected
        #[arg(short, long)]
        all: bool,

        #[arg(long)]
        packages: bool,

        #[arg(long)]
        configurations: bool,
    },

    /// Back up tracked paths, packages, and configurations
    Backup {
        /// Rewrite the archive even when nothing changed
        #[arg(short, long)]
        force: bool,

        /// Back up all domains; the default when none is selected
        #[arg(short, long)]
        all: bool,

        #[arg(long)]
        files: bool,

        #[arg(long)]
        packages: bool,

        #[arg(long)]
        configurations: bool,
    },

    /// Restore the system from the backup archive
    Restore {
        /// Compute and print the plan without changing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Treat every path as manual, yielding merge pairs
        #[arg(short, long)]
        interactive: bool,

        /// Restore all domains; the default when none is selected
        #[arg(short, long)]
        all: bool,

        #[arg(long)]
        files: bool,

        #[arg(long)]
        packages: bool,

        #[arg(long)]
        configurations: bool,
    },

    /// Change sysback settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Add a path to be tracked for backup
    AddTrackedPath {
        /// Path pattern; may embed $VAR placeholders
        path: String,

        /// Restore strategy for the path
        #[arg(short, long, value_enum, default_value = "auto")]
        strategy: Strategy,
    },

    /// Remove a previously tracked path
    RemoveTrackedPath { path: String },

    /// Add an exclude subpath (literal prefix) to a tracked path
    AddExcludeSubpath { path: String, subpath: PathBuf },

    /// Remove an exclude subpath from a tracked path
    RemoveExcludeSubpath { path: String, subpath: PathBuf },

    /// Add an exclude regex to a tracked path
    AddExcludePattern { path: String, pattern: String },

    /// Remove an exclude regex from a tracked path
    RemoveExcludePattern { path: String, pattern: String },

    /// Add a path excluded from snapshot scans
    AddScanExcludePath { path: PathBuf },

    /// Remove a scan exclude path
    RemoveScanExcludePath { path: PathBuf },

    /// Add a regex excluding paths from snapshot scans
    AddScanExcludePattern { pattern: String },

    /// Remove a scan exclude regex
    RemoveScanExcludePattern { pattern: String },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e:#}", "Error:".red().bold());
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Completion { shell } = &cli.command {
        print_completions(*shell, &mut Cli::command());
        return Ok(());
    }

    let mut ctx = SysbackContext::new(cli.conf_dir, cli.target_dir)?;

    match cli.command {
        Commands::Scan {
            paths,
            list,
            remove,
        } => {
            if list {
                commands::scan::list(&ctx)?;
            } else if let Some(key) = remove {
                commands::scan::remove(&ctx, key)?;
            } else {
                commands::scan::execute(&ctx, &paths)?;
            }
        }
        Commands::Diff {
            from_time,
            to_time,
            list,
            paths,
        } => {
            if list {
                commands::scan::list(&ctx)?;
            } else {
                commands::diff::execute(&ctx, from_time, to_time, &paths)?;
            }
        }
        Commands::Check {
            all,
            packages,
            configurations,
        } => {
            let (packages, configurations) = select2(all, packages, configurations);
            commands::check::execute(&ctx, packages, configurations)?;
        }
        Commands::Backup {
            force,
            all,
            files,
            packages,
            configurations,
        } => {
            let (files, packages, configurations) = select3(all, files, packages, configurations);
            commands::backup::execute(&ctx, force, files, packages, configurations)?;
        }
        Commands::Restore {
            dry_run,
            interactive,
            all,
            files,
            packages,
            configurations,
        } => {
            let (files, packages, configurations) = select3(all, files, packages, configurations);
            commands::restore::execute(&ctx, dry_run, interactive, files, packages, configurations)?;
        }
        Commands::Settings { action } => match action {
            SettingsAction::AddTrackedPath { path, strategy } => {
                commands::settings::add_tracked_path(&mut ctx, &path, strategy)?;
            }
            SettingsAction::RemoveTrackedPath { path } => {
                commands::settings::remove_tracked_path(&mut ctx, &path)?;
            }
            SettingsAction::AddExcludeSubpath { path, subpath } => {
                commands::settings::add_exclude_subpath(&mut ctx, &path, subpath)?;
            }
            SettingsAction::RemoveExcludeSubpath { path, subpath } => {
                commands::settings::remove_exclude_subpath(&mut ctx, &path, &subpath)?;
            }
            SettingsAction::AddExcludePattern { path, pattern } => {
                commands::settings::add_exclude_pattern(&mut ctx, &path, &pattern)?;
            }
            SettingsAction::RemoveExcludePattern { path, pattern } => {
                commands::settings::remove_exclude_pattern(&mut ctx, &path, &pattern)?;
            }
            SettingsAction::AddScanExcludePath { path } => {
                commands::settings::add_scan_exclude_path(&mut ctx, path)?;
            }
            SettingsAction::RemoveScanExcludePath { path } => {
                commands::settings::remove_scan_exclude_path(&mut ctx, &path)?;
            }
            SettingsAction::AddScanExcludePattern { pattern } => {
                commands::settings::add_scan_exclude_pattern(&mut ctx, &pattern)?;
            }
            SettingsAction::RemoveScanExcludePattern { pattern } => {
                commands::settings::remove_scan_exclude_pattern(&mut ctx, &pattern)?;
            }
        },
        Commands::Completion { .. } => unreachable!("handled before context creation"),
    }

    Ok(())
}

/// Domain selectors default to everything when none is given.
const fn select2(all: bool, a: bool, b: bool) -> (bool, bool) {
    if all || (!a && !b) { (true, true) } else { (a, b) }
}

const fn select3(all: bool, a: bool, b: bool, c: bool) -> (bool, bool, bool) {
    if all || (!a && !b && !c) {
        (true, true, true)
    } else {
        (a, b, c)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "sysback=debug" } else { "sysback=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
