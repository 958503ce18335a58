//! Install-duration statistics
//!
//! The install watcher records how long each installation took, keyed by
//! profile, OS version, and hardware sizing. Later runs with the same key use
//! the median of the recorded samples as an ETA in heartbeat logs.
//!
//! The backing file is best-effort, not authoritative: a missing or malformed
//! file simply means "no estimate available", and writes are full-file
//! replacements through a temporary file and atomic rename. Concurrent
//! writers can at most lose one observation; no locking across processes is
//! needed.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::shared::Clock;

/// Samples retained per profile key, FIFO
pub const MAX_SAMPLES_PER_KEY: usize = 30;

/// Observed install durations per profile key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallDurationStats {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileSamples>,
}

/// The sample sequence for one profile key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSamples {
    /// Observed durations in seconds, oldest first
    pub samples_sec: Vec<u64>,

    /// When the newest sample was recorded
    pub updated_at: DateTime<Utc>,
}

/// The stats key for a profile + sizing combination
///
/// Shape: `<profile>-<os_version>_cpu-<n>_mem-<mb>`.
#[must_use]
pub fn profile_key(profile: &str, os_version: &str, cpus: u32, memory_mb: u64) -> String {
    format!("{profile}-{os_version}_cpu-{cpus}_mem-{memory_mb}")
}

/// Errors recording a sample
#[derive(Debug, Error)]
pub enum InstallStatsError {
    #[error("failed to serialize install stats: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write install stats to '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Persistent store for install-duration samples
pub struct InstallStatsStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl InstallStatsStore {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Load the stats file; missing or malformed content reads as empty
    #[must_use]
    pub fn load(&self) -> InstallDurationStats {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return InstallDurationStats::default(),
        };

        match serde_json::from_str(&content) {
            Ok(stats) => stats,
            Err(error) => {
                debug!(
                    operation = "install_stats",
                    path = %self.path.display(),
                    %error,
                    "Malformed install stats file, treating as empty"
                );
                InstallDurationStats::default()
            }
        }
    }

    /// Median of the recorded samples for `key`, if any
    #[must_use]
    pub fn median(&self, key: &str) -> Option<Duration> {
        let stats = self.load();
        let samples = &stats.profiles.get(key)?.samples_sec;
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.clone();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        let median_sec = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2
        } else {
            sorted[mid]
        };
        Some(Duration::from_secs(median_sec))
    }

    /// Append one observation for `key`, keeping the newest 30 samples
    ///
    /// The write is a full-file replacement: serialize to a temporary file in
    /// the same directory, then rename over the target.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the filesystem write fails.
    pub fn record(&self, key: &str, duration: Duration) -> Result<(), InstallStatsError> {
        let _guard = self.write_lock.lock();

        let mut stats = self.load();
        let now = self.clock.now();
        let entry = stats
            .profiles
            .entry(key.to_string())
            .or_insert_with(|| ProfileSamples {
                samples_sec: Vec::new(),
                updated_at: now,
            });

        entry.samples_sec.push(duration.as_secs());
        if entry.samples_sec.len() > MAX_SAMPLES_PER_KEY {
            let excess = entry.samples_sec.len() - MAX_SAMPLES_PER_KEY;
            entry.samples_sec.drain(..excess);
        }
        entry.updated_at = now;

        self.replace_file(&stats)
    }

    fn replace_file(&self, stats: &InstallDurationStats) -> Result<(), InstallStatsError> {
        let serialized = serde_json::to_string_pretty(stats)?;

        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        fs::create_dir_all(&parent).map_err(|source| InstallStatsError::Write {
            path: parent.display().to_string(),
            source,
        })?;

        let mut temp =
            tempfile::NamedTempFile::new_in(&parent).map_err(|source| InstallStatsError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        temp.write_all(serialized.as_bytes())
            .map_err(|source| InstallStatsError::Write {
                path: self.path.display().to_string(),
                source,
            })?;
        temp.persist(&self.path)
            .map_err(|source| InstallStatsError::Write {
                path: self.path.display().to_string(),
                source: source.error,
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::shared::clock::testing::FixedClock;
    use crate::shared::SystemClock;

    fn store(dir: &TempDir) -> InstallStatsStore {
        InstallStatsStore::new(dir.path().join("install-stats.json"), Arc::new(SystemClock))
    }

    #[test]
    fn it_should_build_the_profile_key_from_profile_and_sizing() {
        assert_eq!(
            profile_key("ubuntu", "24.04", 2, 2048),
            "ubuntu-24.04_cpu-2_mem-2048"
        );
    }

    #[test]
    fn it_should_treat_a_missing_file_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store.load().profiles.is_empty());
        assert_eq!(store.median("ubuntu-24.04_cpu-2_mem-2048"), None);
    }

    #[test]
    fn it_should_treat_a_malformed_file_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(dir.path().join("install-stats.json"), "{not json").unwrap();

        assert!(store.load().profiles.is_empty());
    }

    #[test]
    fn it_should_record_samples_and_compute_the_median() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let key = profile_key("ubuntu", "24.04", 2, 2048);

        for secs in [600, 300, 900] {
            store.record(&key, Duration::from_secs(secs)).unwrap();
        }

        assert_eq!(store.median(&key), Some(Duration::from_secs(600)));
    }

    #[test]
    fn it_should_average_the_two_middle_samples_for_even_counts() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let key = "k";

        for secs in [100, 200, 300, 400] {
            store.record(key, Duration::from_secs(secs)).unwrap();
        }

        assert_eq!(store.median(key), Some(Duration::from_secs(250)));
    }

    #[test]
    fn it_should_cap_samples_at_30_keeping_the_most_recent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let key = "k";

        for secs in 0..35 {
            store.record(key, Duration::from_secs(secs)).unwrap();
        }

        let stats = store.load();
        let samples = &stats.profiles[key].samples_sec;
        assert_eq!(samples.len(), MAX_SAMPLES_PER_KEY);
        assert_eq!(samples.first(), Some(&5));
        assert_eq!(samples.last(), Some(&34));
    }

    #[test]
    fn it_should_stamp_updated_at_from_the_clock() {
        let dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0).unwrap();
        let store = InstallStatsStore::new(
            dir.path().join("install-stats.json"),
            Arc::new(FixedClock::new(now)),
        );

        store.record("k", Duration::from_secs(60)).unwrap();

        assert_eq!(store.load().profiles["k"].updated_at, now);
    }

    #[test]
    fn it_should_keep_independent_sequences_per_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.record("a", Duration::from_secs(10)).unwrap();
        store.record("b", Duration::from_secs(20)).unwrap();

        assert_eq!(store.median("a"), Some(Duration::from_secs(10)));
        assert_eq!(store.median("b"), Some(Duration::from_secs(20)));
    }
}
