//! Drift reconciliation between live package/configuration state and the
//! persisted decision ledger.
//!
//! Each run enumerates live state, surfaces entities that have no
//! decision (or whose tracked value drifted) one at a time through a
//! [`DecisionProvider`], and persists every non-skip decision
//! immediately. The provider is a suspension boundary: interactive
//! callers prompt, automation supplies decisions programmatically, and a
//! `Skip` leaves the entity unresolved for the next run without writing
//! anything.
//!
//! Ordering is deterministic so repeated runs present the same sequence:
//! the package domain is processed before the config domain, and entities
//! within a domain in identifier-lexical order.

use crate::external::{ConfigStore, PackageManager};
use crate::storage::state::{ConfigDecision, ConfigRecord, PackageDecision, State};
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;

/// Operator choice for an unresolved package. `Skip` is transient and is
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageChoice {
    Dependency,
    Ignore,
    Remove,
    Track,
    Skip,
}

/// Operator choice for an unresolved configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChoice {
    Ignore,
    Track,
    Skip,
}

/// An unresolved package surfaced to the decision provider.
#[derive(Debug, Clone)]
pub struct PackageDrift {
    pub name: String,
    pub installed: bool,
}

/// An unresolved configuration key surfaced to the decision provider.
#[derive(Debug, Clone)]
pub struct ConfigDrift {
    pub key: String,
    /// Recorded or baseline value; `None` when the key is new
    pub previous: Option<String>,
    /// Live value; `None` when the key disappeared
    pub current: Option<String>,
}

/// Suspension boundary for decisions.
///
/// The engine yields one drifted entity at a time and resumes only after
/// receiving a choice. Implementations must not assume they are called
/// for every entity every run; resolved entities are never re-surfaced.
pub trait DecisionProvider {
    /// Choose a strategy for an unresolved package.
    ///
    /// # Errors
    ///
    /// May fail on I/O problems with the underlying prompt channel.
    fn decide_package(&mut self, drift: &PackageDrift) -> Result<PackageChoice>;

    /// Choose a strategy for an unresolved configuration key.
    ///
    /// # Errors
    ///
    /// May fail on I/O problems with the underlying prompt channel.
    fn decide_config(&mut self, drift: &ConfigDrift) -> Result<ConfigChoice>;
}

/// Non-interactive provider: leaves every entity unresolved.
pub struct SkipAll;

impl DecisionProvider for SkipAll {
    fn decide_package(&mut self, _drift: &PackageDrift) -> Result<PackageChoice> {
        Ok(PackageChoice::Skip)
    }

    fn decide_config(&mut self, _drift: &ConfigDrift) -> Result<ConfigChoice> {
        Ok(ConfigChoice::Skip)
    }
}

/// Outcome of one reconciliation pass over a domain.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Decisions persisted this run
    pub resolved: usize,
    /// Entities left unresolved for the next run
    pub skipped: usize,
    /// Out-of-sync observations about already-decided entities
    pub notes: Vec<String>,
}

impl ReconcileReport {
    #[must_use]
    pub fn no_change(&self) -> bool {
        self.resolved == 0 && self.skipped == 0 && self.notes.is_empty()
    }
}

/// Drives the per-entity state machine against the decision ledger.
pub struct Reconciler<'a> {
    state: &'a mut State,
    state_path: &'a Path,
}

impl<'a> Reconciler<'a> {
    pub fn new(state: &'a mut State, state_path: &'a Path) -> Self {
        Self { state, state_path }
    }

    /// Reconciles the package domain.
    ///
    /// Any package in the live installed set (or the scanned baseline)
    /// with no ledger entry is unresolved. Decided packages are only
    /// reported as notes when their decision is out of sync with the
    /// live state.
    ///
    /// # Errors
    ///
    /// Fails if the installed-set query fails or the ledger cannot be
    /// written; per-entity decisions themselves cannot fail the pass.
    pub fn check_packages(
        &mut self,
        manager: &dyn PackageManager,
        provider: &mut dyn DecisionProvider,
    ) -> Result<ReconcileReport> {
        let installed = manager.installed()?;
        let mut report = ReconcileReport::default();

        let candidates: BTreeSet<String> = installed
            .iter()
            .chain(self.state.scanned_packages.iter())
            .cloned()
            .collect();

        for name in candidates {
            let is_installed = installed.contains(&name);

            if let Some(decision) = self.state.package_decisions.get(&name) {
                match decision {
                    PackageDecision::Track if !is_installed => {
                        report.notes.push(format!("{name} is not installed"));
                    }
                    PackageDecision::Remove if is_installed => {
                        report.notes.push(format!("{name} is redundant"));
                    }
                    PackageDecision::Dependency if is_installed => {
                        report.notes.push(format!("{name} is manually installed"));
                    }
                    _ => {}
                }
                continue;
            }

            let drift = PackageDrift {
                name: name.clone(),
                installed: is_installed,
            };
            match provider.decide_package(&drift)? {
                PackageChoice::Skip => report.skipped += 1,
                choice => {
                    let decision = match choice {
                        PackageChoice::Dependency => PackageDecision::Dependency,
                        PackageChoice::Ignore => PackageDecision::Ignore,
                        PackageChoice::Remove => PackageDecision::Remove,
                        _ => PackageDecision::Track,
                    };
                    self.state.package_decisions.insert(name, decision);
                    self.state.save(self.state_path)?;
                    report.resolved += 1;
                }
            }
        }

        Ok(report)
    }

    /// Reconciles the config domain.
    ///
    /// A key with no decision is unresolved when its live value differs
    /// from the scanned baseline. A `track`ed key is re-surfaced whenever
    /// its live value differs from the recorded value: value drift must
    /// be re-approved. With no baseline yet (no backup has run), nothing
    /// is surfaced.
    ///
    /// # Errors
    ///
    /// Fails if the live dump fails or the ledger cannot be written.
    pub fn check_configs(
        &mut self,
        store: &dyn ConfigStore,
        provider: &mut dyn DecisionProvider,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        if self.state.scanned_configs.is_empty() {
            return Ok(report);
        }

        let current = store.current()?;

        let keys: BTreeSet<String> = current
            .keys()
            .chain(self.state.scanned_configs.keys())
            .cloned()
            .collect();

        for key in keys {
            let live = current.get(&key).cloned();
            let baseline = self.state.scanned_configs.get(&key).cloned();

            let drift = match self.state.config_decisions.get(&key) {
                Some(record) if record.decision == ConfigDecision::Ignore => continue,
                Some(record) => {
                    if live == record.recorded_value {
                        continue;
                    }
                    ConfigDrift {
                        key: key.clone(),
                        previous: record.recorded_value.clone(),
                        current: live.clone(),
                    }
                }
                None => {
                    if live == baseline {
                        continue;
                    }
                    ConfigDrift {
                        key: key.clone(),
                        previous: baseline,
                        current: live.clone(),
                    }
                }
            };

            match provider.decide_config(&drift)? {
                ConfigChoice::Skip => report.skipped += 1,
                ConfigChoice::Track => {
                    self.state.config_decisions.insert(
                        key,
                        ConfigRecord {
                            decision: ConfigDecision::Track,
                            recorded_value: live,
                        },
                    );
                    self.state.save(self.state_path)?;
                    report.resolved += 1;
                }
                ConfigChoice::Ignore => {
                    self.state.config_decisions.insert(
                        key,
                        ConfigRecord {
                            decision: ConfigDecision::Ignore,
                            recorded_value: None,
                        },
                    );
                    self.state.save(self.state_path)?;
                    report.resolved += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::tempdir;

    struct FakePackages {
        installed: BTreeSet<String>,
    }

    impl PackageManager for FakePackages {
        fn name(&self) -> &str {
            "fake"
        }
        fn installed(&self) -> Result<BTreeSet<String>> {
            Ok(self.installed.clone())
        }
        fn install(&self, _package: &str) -> Result<()> {
            Ok(())
        }
        fn mark_dependency(&self, _package: &str) -> Result<()> {
            Ok(())
        }
        fn purge(&self, _package: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeConfigs {
        values: BTreeMap<String, String>,
    }

    impl ConfigStore for FakeConfigs {
        fn name(&self) -> &str {
            "fake"
        }
        fn current(&self) -> Result<BTreeMap<String, String>> {
            Ok(self.values.clone())
        }
        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Provider that answers from a script and records what it saw.
    struct Scripted {
        package_answers: Vec<PackageChoice>,
        config_answers: Vec<ConfigChoice>,
        seen: Vec<String>,
    }

    impl Scripted {
        fn packages(answers: Vec<PackageChoice>) -> Self {
            Self {
                package_answers: answers,
                config_answers: Vec::new(),
                seen: Vec::new(),
            }
        }

        fn configs(answers: Vec<ConfigChoice>) -> Self {
            Self {
                package_answers: Vec::new(),
                config_answers: answers,
                seen: Vec::new(),
            }
        }
    }

    impl DecisionProvider for Scripted {
        fn decide_package(&mut self, drift: &PackageDrift) -> Result<PackageChoice> {
            self.seen.push(drift.name.clone());
            Ok(self.package_answers.remove(0))
        }
        fn decide_config(&mut self, drift: &ConfigDrift) -> Result<ConfigChoice> {
            self.seen.push(drift.key.clone());
            Ok(self.config_answers.remove(0))
        }
    }

    fn pkgs(names: &[&str]) -> FakePackages {
        FakePackages {
            installed: names.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_new_packages_surface_in_lexical_order() -> Result<()> {
        let dir = tempdir()?;
        let state_path = dir.path().join("state.bin");
        let mut state = State::default();

        let mut provider = Scripted::packages(vec![
            PackageChoice::Track,
            PackageChoice::Ignore,
            PackageChoice::Skip,
        ]);
        let report = Reconciler::new(&mut state, &state_path)
            .check_packages(&pkgs(&["zsh", "curl", "ripgrep"]), &mut provider)?;

        assert_eq!(provider.seen, vec!["curl", "ripgrep", "zsh"]);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.skipped, 1);

        // Non-skip decisions were persisted immediately
        let reloaded = State::load(&state_path)?;
        assert_eq!(
            reloaded.package_decisions.get("curl"),
            Some(&PackageDecision::Track)
        );
        assert_eq!(
            reloaded.package_decisions.get("ripgrep"),
            Some(&PackageDecision::Ignore)
        );
        assert!(!reloaded.package_decisions.contains_key("zsh"));
        Ok(())
    }

    #[test]
    fn test_ignored_package_never_resurfaces() -> Result<()> {
        let dir = tempdir()?;
        let state_path = dir.path().join("state.bin");
        let mut state = State::default();
        state
            .package_decisions
            .insert("curl".to_string(), PackageDecision::Ignore);

        let mut provider = Scripted::packages(vec![]);
        let report = Reconciler::new(&mut state, &state_path)
            .check_packages(&pkgs(&["curl"]), &mut provider)?;

        assert!(provider.seen.is_empty());
        assert!(report.no_change());
        Ok(())
    }

    #[test]
    fn test_skip_leaves_entity_eligible_next_run() -> Result<()> {
        let dir = tempdir()?;
        let state_path = dir.path().join("state.bin");
        let mut state = State::default();

        let mut provider = Scripted::packages(vec![PackageChoice::Skip]);
        Reconciler::new(&mut state, &state_path).check_packages(&pkgs(&["curl"]), &mut provider)?;
        assert!(state.package_decisions.is_empty());

        let mut provider = Scripted::packages(vec![PackageChoice::Remove]);
        Reconciler::new(&mut state, &state_path).check_packages(&pkgs(&["curl"]), &mut provider)?;
        assert_eq!(
            state.package_decisions.get("curl"),
            Some(&PackageDecision::Remove)
        );
        Ok(())
    }

    #[test]
    fn test_decided_packages_produce_notes() -> Result<()> {
        let dir = tempdir()?;
        let state_path = dir.path().join("state.bin");
        let mut state = State::default();
        state
            .package_decisions
            .insert("gone".to_string(), PackageDecision::Track);
        state
            .package_decisions
            .insert("stale".to_string(), PackageDecision::Remove);
        state.scanned_packages.insert("gone".to_string());

        let mut provider = Scripted::packages(vec![]);
        let report = Reconciler::new(&mut state, &state_path)
            .check_packages(&pkgs(&["stale"]), &mut provider)?;

        assert!(report.notes.contains(&"gone is not installed".to_string()));
        assert!(report.notes.contains(&"stale is redundant".to_string()));
        Ok(())
    }

    #[test]
    fn test_no_config_baseline_surfaces_nothing() -> Result<()> {
        let dir = tempdir()?;
        let state_path = dir.path().join("state.bin");
        let mut state = State::default();

        let store = FakeConfigs {
            values: BTreeMap::from([("a.b.c".to_string(), "1".to_string())]),
        };
        let mut provider = Scripted::configs(vec![]);
        let report =
            Reconciler::new(&mut state, &state_path).check_configs(&store, &mut provider)?;

        assert!(provider.seen.is_empty());
        assert!(report.no_change());
        Ok(())
    }

    #[test]
    fn test_config_drift_from_baseline_surfaces() -> Result<()> {
        let dir = tempdir()?;
        let state_path = dir.path().join("state.bin");
        let mut state = State::default();
        state
            .scanned_configs
            .insert("a.b.c".to_string(), "old".to_string());
        state
            .scanned_configs
            .insert("a.b.same".to_string(), "x".to_string());

        let store = FakeConfigs {
            values: BTreeMap::from([
                ("a.b.c".to_string(), "new".to_string()),
                ("a.b.same".to_string(), "x".to_string()),
            ]),
        };
        let mut provider = Scripted::configs(vec![ConfigChoice::Track]);
        let report =
            Reconciler::new(&mut state, &state_path).check_configs(&store, &mut provider)?;

        assert_eq!(provider.seen, vec!["a.b.c"]);
        assert_eq!(report.resolved, 1);
        // Tracking captured the live value at decision time
        let record = state.config_decisions.get("a.b.c").unwrap();
        assert_eq!(record.decision, ConfigDecision::Track);
        assert_eq!(record.recorded_value, Some("new".to_string()));
        Ok(())
    }

    #[test]
    fn test_tracked_config_resurfaces_on_value_drift() -> Result<()> {
        let dir = tempdir()?;
        let state_path = dir.path().join("state.bin");
        let mut state = State::default();
        state
            .scanned_configs
            .insert("a.b.c".to_string(), "v1".to_string());
        state.config_decisions.insert(
            "a.b.c".to_string(),
            ConfigRecord {
                decision: ConfigDecision::Track,
                recorded_value: Some("v1".to_string()),
            },
        );

        // Live value matches the record: nothing to re-approve
        let store = FakeConfigs {
            values: BTreeMap::from([("a.b.c".to_string(), "v1".to_string())]),
        };
        let mut provider = Scripted::configs(vec![]);
        let report =
            Reconciler::new(&mut state, &state_path).check_configs(&store, &mut provider)?;
        assert!(report.no_change());

        // Live value drifted: re-surfaced even though already tracked
        let store = FakeConfigs {
            values: BTreeMap::from([("a.b.c".to_string(), "v2".to_string())]),
        };
        let mut provider = Scripted::configs(vec![ConfigChoice::Track]);
        let report =
            Reconciler::new(&mut state, &state_path).check_configs(&store, &mut provider)?;
        assert_eq!(report.resolved, 1);
        assert_eq!(
            state
                .config_decisions
                .get("a.b.c")
                .unwrap()
                .recorded_value,
            Some("v2".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_ignored_config_never_resurfaces() -> Result<()> {
        let dir = tempdir()?;
        let state_path = dir.path().join("state.bin");
        let mut state = State::default();
        state
            .scanned_configs
            .insert("a.b.c".to_string(), "v1".to_string());
        state.config_decisions.insert(
            "a.b.c".to_string(),
            ConfigRecord {
                decision: ConfigDecision::Ignore,
                recorded_value: None,
            },
        );

        let store = FakeConfigs {
            values: BTreeMap::from([("a.b.c".to_string(), "anything".to_string())]),
        };
        let mut provider = Scripted::configs(vec![]);
        let report =
            Reconciler::new(&mut state, &state_path).check_configs(&store, &mut provider)?;

        assert!(provider.seen.is_empty());
        assert!(report.no_change());
        Ok(())
    }
}
