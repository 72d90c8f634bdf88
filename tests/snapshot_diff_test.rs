mod common;

use anyhow::Result;
use common::TestEnv;
use filetime::FileTime;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use sysback::diff::DiffEngine;
use sysback::errors::Error;
use sysback::scanner::Scanner;
use sysback::settings::ScanSettings;

fn set_mtime(path: &std::path::Path, epoch: i64) {
    filetime::set_symlink_file_times(
        path,
        FileTime::from_unix_time(epoch, 0),
        FileTime::from_unix_time(epoch, 0),
    )
    .unwrap();
}

/// Scenario from the drawing board: `/a` unchanged, `/b` added at T2,
/// `/c` removed at T2.
#[test]
fn test_scan_store_diff_end_to_end() -> Result<()> {
    let env = TestEnv::new()?;
    let data = env.path().join("data");
    fs::create_dir_all(&data)?;
    fs::write(data.join("a"), "same")?;
    fs::write(data.join("c"), "doomed")?;
    set_mtime(&data.join("a"), 900);
    set_mtime(&data.join("c"), 900);
    set_mtime(&data, 900);

    let scanner = Scanner::from_settings(&ScanSettings::default())?;
    let store = env.ctx.snapshot_store();

    store.save(&scanner.scan(&[data.clone()], 1000)?)?;

    fs::remove_file(data.join("c"))?;
    fs::write(data.join("b"), "fresh")?;
    set_mtime(&data.join("a"), 900);
    set_mtime(&data.join("b"), 1600);
    set_mtime(&data, 900);

    store.save(&scanner.scan(&[data.clone()], 2000)?)?;

    let result = DiffEngine::new(&store).diff(None, None, &[])?;
    assert_eq!(result.added, BTreeSet::from([data.join("b")]));
    assert_eq!(result.removed, BTreeSet::from([data.join("c")]));
    assert!(result.modified.is_empty());
    Ok(())
}

#[test]
fn test_two_scans_of_unchanged_state_diff_empty() -> Result<()> {
    let env = TestEnv::new()?;
    let data = env.make_data_tree()?;

    let scanner = Scanner::from_settings(&ScanSettings::default())?;
    let store = env.ctx.snapshot_store();
    store.save(&scanner.scan(&[data.clone()], 1000)?)?;
    store.save(&scanner.scan(&[data.clone()], 2000)?)?;

    let result = DiffEngine::new(&store).diff(None, None, &[])?;
    assert!(result.is_empty());
    Ok(())
}

#[test]
fn test_size_change_classifies_as_modified() -> Result<()> {
    let env = TestEnv::new()?;
    let data = env.path().join("data");
    fs::create_dir_all(&data)?;
    let file = data.join("grows.txt");
    fs::write(&file, "v1")?;
    set_mtime(&file, 900);
    set_mtime(&data, 900);

    let scanner = Scanner::from_settings(&ScanSettings::default())?;
    let store = env.ctx.snapshot_store();
    store.save(&scanner.scan(&[data.clone()], 1000)?)?;

    fs::write(&file, "version two")?;
    set_mtime(&file, 900);
    set_mtime(&data, 900);
    store.save(&scanner.scan(&[data.clone()], 2000)?)?;

    let result = DiffEngine::new(&store).diff(None, None, &[])?;
    assert_eq!(result.modified, BTreeSet::from([file]));
    assert!(result.added.is_empty());
    assert!(result.removed.is_empty());
    Ok(())
}

/// Only one snapshot at T2=2000; `--from-time 1500` with no snapshot at
/// 1500 reports the changed-since set of entries newer than the cutoff.
#[test]
fn test_cutoff_mode_with_single_snapshot() -> Result<()> {
    let env = TestEnv::new()?;
    let data = env.path().join("data");
    fs::create_dir_all(&data)?;
    fs::write(data.join("old.txt"), "old")?;
    fs::write(data.join("new.txt"), "new")?;
    set_mtime(&data.join("old.txt"), 1400);
    set_mtime(&data.join("new.txt"), 1600);
    set_mtime(&data, 1400);

    let scanner = Scanner::from_settings(&ScanSettings::default())?;
    let store = env.ctx.snapshot_store();
    store.save(&scanner.scan(&[data.clone()], 2000)?)?;

    let result = DiffEngine::new(&store).diff(Some(1500), None, &[])?;
    assert_eq!(result.added, BTreeSet::from([data.join("new.txt")]));
    // Cutoff mode cannot know about removals
    assert!(result.removed.is_empty());
    assert!(result.modified.is_empty());
    Ok(())
}

#[test]
fn test_default_diff_needs_two_snapshots() -> Result<()> {
    let env = TestEnv::new()?;
    let data = env.make_data_tree()?;

    let scanner = Scanner::from_settings(&ScanSettings::default())?;
    let store = env.ctx.snapshot_store();
    store.save(&scanner.scan(&[data], 1000)?)?;

    let err = DiffEngine::new(&store).diff(None, None, &[]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InsufficientSnapshots)
    ));
    Ok(())
}

#[test]
fn test_snapshot_keys_listed_ascending() -> Result<()> {
    let env = TestEnv::new()?;
    let data = env.make_data_tree()?;

    let scanner = Scanner::from_settings(&ScanSettings::default())?;
    let store = env.ctx.snapshot_store();
    for ts in [3000, 1000, 2000] {
        store.save(&scanner.scan(&[data.clone()], ts)?)?;
    }

    assert_eq!(store.list_keys()?, vec![1000, 2000, 3000]);
    Ok(())
}

#[test]
fn test_diff_path_filter_restricts_result() -> Result<()> {
    let env = TestEnv::new()?;
    let data = env.path().join("data");
    fs::create_dir_all(data.join("one"))?;
    fs::create_dir_all(data.join("two"))?;

    let scanner = Scanner::from_settings(&ScanSettings::default())?;
    let store = env.ctx.snapshot_store();
    store.save(&scanner.scan(&[data.clone()], 1000)?)?;

    fs::write(data.join("one/x.txt"), "x")?;
    fs::write(data.join("two/y.txt"), "y")?;
    store.save(&scanner.scan(&[data.clone()], 2000)?)?;

    let result = DiffEngine::new(&store).diff(None, None, &[data.join("one")])?;
    let added: Vec<PathBuf> = result.added.iter().cloned().collect();
    assert!(added.contains(&data.join("one/x.txt")));
    assert!(!added.iter().any(|p| p.starts_with(data.join("two"))));
    Ok(())
}
