//! Durable per-URL snapshots.
//!
//! Two pieces live on disk: a JSON index mapping each URL to its last
//! fingerprint and check time, and one text file per URL holding the last
//! normalized text. Text files are named by [`url_key`] so storage naming
//! never depends on the characters in a URL.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::normalizer::Fingerprint;
use crate::error::{PagewatchError, Result};

const TEXT_EXTENSION: &str = "txt";
const URL_KEY_LEN: usize = 24;

/// Index entry for one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Fingerprint of the stored text
    pub hash: String,

    /// ISO-8601 UTC time of the last successful fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<String>,
}

/// What `evict_except` removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub index_entries: usize,
    pub text_files: usize,
    pub failed_deletions: usize,
}

impl EvictionReport {
    pub fn is_empty(&self) -> bool {
        self.index_entries == 0 && self.text_files == 0 && self.failed_deletions == 0
    }
}

/// Stable, filesystem-safe storage key for a URL.
pub fn url_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..URL_KEY_LEN].to_string()
}

pub struct ContentStore {
    state_file: PathBuf,
    text_dir: PathBuf,
    index: BTreeMap<String, SnapshotRecord>,
}

impl ContentStore {
    /// Open the store, loading the index if it exists.
    pub fn open(state_file: impl Into<PathBuf>, text_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_file = state_file.into();
        let text_dir = text_dir.into();

        let index = match fs::read_to_string(&state_file) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                PagewatchError::Store(format!(
                    "state file {} is corrupt: {}",
                    state_file.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(PagewatchError::Store(format!(
                    "cannot read state file {}: {}",
                    state_file.display(),
                    e
                )))
            }
        };

        debug!("Loaded {} snapshot record(s) from {}", index.len(), state_file.display());

        Ok(Self {
            state_file,
            text_dir,
            index,
        })
    }

    pub fn prior_fingerprint(&self, url: &str) -> Option<Fingerprint> {
        self.index
            .get(url)
            .map(|record| Fingerprint::from_hex(record.hash.clone()))
    }

    /// Last stored text for `url`, or `None` if it was never stored or has
    /// been evicted.
    pub fn prior_text(&self, url: &str) -> Result<Option<String>> {
        let path = self.text_path(url);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PagewatchError::Store(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Overwrite the snapshot for `url`. The text is on disk when this
    /// returns; the index entry is persisted by [`ContentStore::commit`].
    pub fn record_snapshot(
        &mut self,
        url: &str,
        text: &str,
        fingerprint: &Fingerprint,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        fs::create_dir_all(&self.text_dir).map_err(|e| self.io_error(&self.text_dir, e))?;
        let path = self.text_path(url);
        write_atomic(&path, text.as_bytes()).map_err(|e| self.io_error(&path, e))?;

        self.index.insert(
            url.to_string(),
            SnapshotRecord {
                hash: fingerprint.as_str().to_string(),
                last_checked: Some(checked_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            },
        );
        Ok(())
    }

    /// Forget every URL not in `active`, both index entries and text files.
    pub fn evict_except(&mut self, active: &HashSet<String>) -> Result<EvictionReport> {
        let mut report = EvictionReport::default();

        let before = self.index.len();
        self.index.retain(|url, _| active.contains(url));
        report.index_entries = before - self.index.len();

        let entries = match fs::read_dir(&self.text_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(self.io_error(&self.text_dir, e)),
        };

        let active_keys: HashSet<String> = active.iter().map(|url| url_key(url)).collect();

        for entry in entries {
            let path = entry.map_err(|e| self.io_error(&self.text_dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(TEXT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if active_keys.contains(stem) {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed stale snapshot text {}", path.display());
                    report.text_files += 1;
                }
                Err(e) => {
                    warn!("Could not remove stale snapshot text {}: {}", path.display(), e);
                    report.failed_deletions += 1;
                }
            }
        }

        Ok(report)
    }

    /// Persist the index as a single atomic file replacement.
    pub fn commit(&self) -> Result<()> {
        if let Some(parent) = self.state_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }

        let encoded = serde_json::to_string_pretty(&self.index)?;
        write_atomic(&self.state_file, encoded.as_bytes())
            .map_err(|e| self.io_error(&self.state_file, e))?;

        debug!("Committed {} snapshot record(s) to {}", self.index.len(), self.state_file.display());
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &SnapshotRecord)> {
        self.index.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn text_path(&self, url: &str) -> PathBuf {
        self.text_dir
            .join(url_key(url))
            .with_extension(TEXT_EXTENSION)
    }

    fn io_error(&self, path: &Path, err: std::io::Error) -> PagewatchError {
        PagewatchError::Store(format!("{}: {}", path.display(), err))
    }
}

/// Write to a sibling temp file, sync it, then rename over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;

    fs::rename(temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    fn open_in(dir: &assert_fs::TempDir) -> ContentStore {
        ContentStore::open(dir.child("state.json").path(), dir.child("state_text").path()).unwrap()
    }

    fn active(urls: &[&str]) -> HashSet<String> {
        urls.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn test_url_key_is_stable_truncated_hex() {
        let key = url_key("https://example.com/a");
        assert_eq!(key.len(), 24);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, url_key("https://example.com/a"));
        assert_ne!(key, url_key("https://example.com/b"));
    }

    #[test]
    fn test_empty_store_has_no_priors() {
        let dir = assert_fs::TempDir::new().unwrap();
        let store = open_in(&dir);
        assert!(store.is_empty());
        assert!(store.prior_fingerprint("https://example.com").is_none());
        assert!(store.prior_text("https://example.com").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = assert_fs::TempDir::new().unwrap();
        let url = "https://example.com/programs";
        let fp = Fingerprint::of("Program A: open");
        let checked_at = DateTime::parse_from_rfc3339("2026-10-19T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut store = open_in(&dir);
        store.record_snapshot(url, "Program A: open", &fp, checked_at).unwrap();
        store.commit().unwrap();

        dir.child("state_text")
            .child(format!("{}.txt", url_key(url)))
            .assert("Program A: open");
        let state = fs::read_to_string(dir.child("state.json").path()).unwrap();
        assert!(state.contains("\"last_checked\": \"2026-10-19T03:04:05Z\""), "{state}");

        let reopened = open_in(&dir);
        assert_eq!(reopened.prior_fingerprint(url), Some(fp));
        assert_eq!(reopened.prior_text(url).unwrap().as_deref(), Some("Program A: open"));
    }

    #[test]
    fn test_record_overwrites_previous_snapshot() {
        let dir = assert_fs::TempDir::new().unwrap();
        let url = "https://example.com";
        let mut store = open_in(&dir);

        store.record_snapshot(url, "old", &Fingerprint::of("old"), Utc::now()).unwrap();
        store.record_snapshot(url, "new", &Fingerprint::of("new"), Utc::now()).unwrap();

        assert_eq!(store.entries().count(), 1);
        assert_eq!(store.prior_fingerprint(url), Some(Fingerprint::of("new")));
        assert_eq!(store.prior_text(url).unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_evict_removes_index_and_text() {
        let dir = assert_fs::TempDir::new().unwrap();
        let keep = "https://example.com/keep";
        let drop = "https://example.com/drop";

        let mut store = open_in(&dir);
        store.record_snapshot(keep, "keep", &Fingerprint::of("keep"), Utc::now()).unwrap();
        store.record_snapshot(drop, "drop", &Fingerprint::of("drop"), Utc::now()).unwrap();
        store.commit().unwrap();

        let mut store = open_in(&dir);
        let report = store.evict_except(&active(&[keep])).unwrap();
        store.commit().unwrap();

        assert_eq!(report.index_entries, 1);
        assert_eq!(report.text_files, 1);
        assert!(store.prior_fingerprint(drop).is_none());
        assert!(store.prior_text(drop).unwrap().is_none());
        assert!(store.prior_text(keep).unwrap().is_some());
        dir.child("state_text")
            .child(format!("{}.txt", url_key(drop)))
            .assert(predicate::path::missing());
        let state = fs::read_to_string(dir.child("state.json").path()).unwrap();
        assert!(!state.contains(drop));
    }

    #[test]
    fn test_evict_removes_orphaned_text_without_index_entry() {
        let dir = assert_fs::TempDir::new().unwrap();
        let orphan = dir.child("state_text").child(format!("{}.txt", url_key("https://gone")));
        orphan.write_str("stale").unwrap();
        let unrelated = dir.child("state_text").child("notes.md");
        unrelated.write_str("keep me").unwrap();

        let mut store = open_in(&dir);
        let report = store.evict_except(&active(&["https://example.com"])).unwrap();

        assert_eq!(report.text_files, 1);
        orphan.assert(predicate::path::missing());
        unrelated.assert(predicate::path::exists());
    }

    #[test]
    fn test_evict_without_text_dir_is_a_no_op() {
        let dir = assert_fs::TempDir::new().unwrap();
        let mut store = open_in(&dir);
        let report = store.evict_except(&active(&[])).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_corrupt_state_file_is_a_store_error() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("state.json").write_str("{ not json").unwrap();

        let result = ContentStore::open(dir.child("state.json").path(), dir.child("state_text").path());
        assert!(matches!(result, Err(PagewatchError::Store(_))));
    }

    #[test]
    fn test_reads_state_written_without_timestamps() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("state.json")
            .write_str(r#"{ "https://example.com": { "hash": "abc123" } }"#)
            .unwrap();

        let store = open_in(&dir);
        assert_eq!(
            store.prior_fingerprint("https://example.com"),
            Some(Fingerprint::from_hex("abc123"))
        );
    }

    #[test]
    fn test_commit_leaves_no_temp_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let mut store = open_in(&dir);
        store.record_snapshot("https://a", "a", &Fingerprint::of("a"), Utc::now()).unwrap();
        store.commit().unwrap();
        store.commit().unwrap();

        dir.child("state.json").assert(predicate::path::exists());
        dir.child("state.json.tmp").assert(predicate::path::missing());
    }
}
