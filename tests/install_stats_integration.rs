//! Install-duration statistics file, exercised through the public API

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use vcenter_vm_bootstrap_lib::domain::install_stats::MAX_SAMPLES_PER_KEY;
use vcenter_vm_bootstrap_lib::domain::{profile_key, InstallStatsStore};
use vcenter_vm_bootstrap_lib::shared::SystemClock;

#[test]
fn it_should_retain_only_the_most_recent_thirty_samples() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("install-stats.json");
    let store = InstallStatsStore::new(path.clone(), Arc::new(SystemClock));
    let key = profile_key("ubuntu", "24.04", 2, 2048);

    let extra = 7;
    for secs in 0..(MAX_SAMPLES_PER_KEY as u64 + extra) {
        store.record(&key, Duration::from_secs(secs)).unwrap();
    }

    let stats = store.load();
    let samples = &stats.profiles[&key].samples_sec;
    assert_eq!(samples.len(), MAX_SAMPLES_PER_KEY);
    assert_eq!(*samples.first().unwrap(), extra);
    assert_eq!(*samples.last().unwrap(), MAX_SAMPLES_PER_KEY as u64 + extra - 1);

    // The file itself is the documented JSON shape
    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw["profiles"][key.as_str()]["samples_sec"].is_array());
    assert!(raw["profiles"][key.as_str()]["updated_at"].is_string());
}

#[test]
fn it_should_survive_a_corrupted_stats_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("install-stats.json");
    fs::write(&path, "{definitely not json").unwrap();

    let store = InstallStatsStore::new(path, Arc::new(SystemClock));
    assert_eq!(store.median("anything"), None);

    // A record replaces the corrupted content entirely
    store.record("k", Duration::from_secs(60)).unwrap();
    assert_eq!(store.median("k"), Some(Duration::from_secs(60)));
}
