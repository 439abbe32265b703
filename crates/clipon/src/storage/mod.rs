//! Persistent history storage.
//!
//! Clip text lives in an append-only content log ([`DataLog`]); a JSON index
//! ([`MetaStore`]) records where each retained entry sits in that log.
//!
//! Write order is always content first, index second. An interrupted append
//! therefore leaves at worst some unindexed bytes at the tail of the log,
//! and [`PersistentHistory::load_all`] cuts those off on the next start.
//!
//! Nothing is ever rewritten in place. Deletions are realised by
//! [`PersistentHistory::compact`], which copies the surviving entries into a
//! fresh log and index.

pub mod data_log;
pub mod meta;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::history::{Entry, LogSpan};

pub use data_log::DataLog;
pub use meta::{MetaRecord, MetaStore};

/// The content log and its index, owned together.
#[derive(Debug)]
pub struct PersistentHistory {
    data: DataLog,
    meta: MetaStore,
}

impl PersistentHistory {
    /// Open the content log and index.
    ///
    /// # Errors
    ///
    /// Returns an error if either file can't be opened, or if the index
    /// exists but isn't a clipon index.
    pub fn open(data_path: impl AsRef<Path>, meta_path: impl AsRef<Path>) -> Result<Self> {
        let meta = MetaStore::open(meta_path)?;
        let data = DataLog::open(data_path)?;
        Ok(Self { data, meta })
    }

    /// Path of the content log.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        self.data.path()
    }

    /// Path of the index.
    #[must_use]
    pub fn meta_path(&self) -> &Path {
        self.meta.path()
    }

    /// Number of index records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.meta.len()
    }

    /// Write `entry` to the end of the log and index it.
    ///
    /// Returns `false` if either write failed; the failure is logged and the
    /// entry's location stays unset.
    pub fn append_entry(&mut self, entry: &mut Entry) -> bool {
        entry.set_location(None);

        let Some(span) = self.write_text(entry) else {
            return false;
        };

        if let Err(e) = self.meta.push(MetaRecord::new(entry.timestamp(), span)) {
            error!(error = %e, "Failed to index entry");
            return false;
        }

        entry.set_location(Some(span));
        true
    }

    /// Read every indexed entry back, oldest first.
    ///
    /// Records whose bytes can't be read or aren't valid UTF-8 are skipped.
    /// The log is then cut to the end of the last readable entry, dropping
    /// anything that was written but never indexed. If records were skipped
    /// the index is rewritten so it matches the returned entries.
    pub fn load_all(&mut self) -> Vec<Entry> {
        let mut entries = Vec::with_capacity(self.meta.len());
        let mut skipped = self.meta.skipped_on_open();
        let mut frontier: u64 = 0;

        for (position, record) in self.meta.records().iter().enumerate() {
            let span = record.span();
            let text = match self.data.read(span) {
                Ok(bytes) => String::from_utf8(bytes).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match text {
                Ok(text) => {
                    if let Some(end) = span.end() {
                        frontier = frontier.max(end);
                    }
                    entries.push(Entry::restored(text, record.time, span));
                }
                Err(reason) => {
                    warn!(
                        position,
                        offset = span.offset,
                        length = span.length,
                        %reason,
                        "Skipping unreadable history entry"
                    );
                    skipped += 1;
                }
            }
        }

        match self.data.len() {
            Ok(len) if len > frontier => {
                info!(
                    dropped = len - frontier,
                    "Truncating unindexed bytes from data log"
                );
                if let Err(e) = self.data.truncate(frontier) {
                    error!(error = %e, "Failed to truncate data log");
                }
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Failed to stat data log"),
        }

        if skipped > 0 {
            let survivors = entries
                .iter()
                .filter_map(|entry| {
                    entry
                        .location()
                        .map(|span| MetaRecord::new(entry.timestamp(), span))
                })
                .collect();
            if let Err(e) = self.meta.replace_all(survivors) {
                error!(error = %e, "Failed to rewrite history index");
            }
        }

        debug!(entries = entries.len(), skipped, "Loaded history");
        entries
    }

    /// Rewrite the log and index to hold exactly `entries`, in order.
    ///
    /// The index is emptied before the log is touched, so an interruption
    /// never leaves index records pointing at rewritten bytes. Returns the
    /// number of entries written.
    pub fn compact(&mut self, entries: &mut [Entry]) -> usize {
        for entry in entries.iter_mut() {
            entry.set_location(None);
        }

        if !self.clear() {
            return 0;
        }

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries.iter_mut() {
            match self.data.write(entry.text().as_bytes()) {
                Ok(span) => records.push((MetaRecord::new(entry.timestamp(), span), entry)),
                Err(e) => error!(error = %e, "Write error when compacting entry"),
            }
        }

        // One sync for the whole batch, before the index refers to it.
        if let Err(e) = self.data.sync() {
            error!(error = %e, "Failed to sync compacted data log");
            return 0;
        }

        let (records, written): (Vec<_>, Vec<_>) = records.into_iter().unzip();
        if let Err(e) = self.meta.replace_all(records) {
            error!(error = %e, "Failed to write compacted history index");
            return 0;
        }

        for (entry, record) in written.into_iter().zip(self.meta.records()) {
            entry.set_location(Some(record.span()));
        }

        let count = self.meta.len();
        debug!(entries = count, "Compacted history");
        count
    }

    /// Empty both the index and the log.
    ///
    /// Returns `false` if either step failed; an index that couldn't be
    /// emptied leaves the log untouched.
    pub fn clear(&mut self) -> bool {
        if let Err(e) = self.meta.reset() {
            error!(error = %e, "Failed to reset history index");
            return false;
        }
        if let Err(e) = self.data.truncate(0) {
            error!(error = %e, "Failed to truncate data log");
            return false;
        }
        true
    }

    /// File locations and sizes, for status reports.
    #[must_use]
    pub fn info(&self) -> StorageInfo {
        StorageInfo {
            data_file: self.data.path().to_path_buf(),
            meta_file: self.meta.path().to_path_buf(),
            data_bytes: self.data.len().unwrap_or(0),
            records: self.meta.len(),
        }
    }

    fn write_text(&mut self, entry: &Entry) -> Option<LogSpan> {
        match self.data.append(entry.text().as_bytes()) {
            Ok(span) => Some(span),
            Err(e) => {
                error!(error = %e, "Write error when saving entry");
                None
            }
        }
    }
}

/// Storage statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageInfo {
    /// Content log path.
    pub data_file: PathBuf,
    /// Index path.
    pub meta_file: PathBuf,
    /// Content log size in bytes.
    pub data_bytes: u64,
    /// Number of index records.
    pub records: usize,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn data_path(&self) -> PathBuf {
            self.dir.path().join("history.txt")
        }

        fn meta_path(&self) -> PathBuf {
            self.dir.path().join("clipon.json")
        }

        fn open(&self) -> PersistentHistory {
            PersistentHistory::open(self.data_path(), self.meta_path()).unwrap()
        }
    }

    fn texts(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(Entry::text).collect()
    }

    #[test]
    fn test_append_sets_location() {
        let fx = Fixture::new();
        let mut store = fx.open();

        let mut first = Entry::capture("one", None);
        let mut second = Entry::capture("two", None);
        assert!(store.append_entry(&mut first));
        assert!(store.append_entry(&mut second));

        assert_eq!(first.location(), Some(LogSpan { offset: 0, length: 4 }));
        assert_eq!(second.location(), Some(LogSpan { offset: 4, length: 4 }));
        assert_eq!(store.record_count(), 2);
    }

    #[test]
    fn test_round_trip_across_reopen() {
        let fx = Fixture::new();
        let mut originals = vec![
            Entry::capture("alpha", None),
            Entry::capture("βeta", None),
            Entry::capture("", None),
        ];
        {
            let mut store = fx.open();
            for entry in &mut originals {
                assert!(store.append_entry(entry));
            }
        }

        let loaded = fx.open().load_all();
        assert_eq!(loaded.len(), 3);
        for (a, b) in originals.iter().zip(&loaded) {
            assert_eq!(a.text(), b.text());
            assert_eq!(a.timestamp(), b.timestamp());
            assert_eq!(a.location(), b.location());
        }
    }

    #[test]
    fn test_load_truncates_unindexed_tail() {
        let fx = Fixture::new();
        {
            let mut store = fx.open();
            store.append_entry(&mut Entry::capture("kept", None));
        }

        // Simulate a crash between the content write and the index write.
        let mut raw = std::fs::OpenOptions::new()
            .append(true)
            .open(fx.data_path())
            .unwrap();
        raw.write_all(b"orphaned bytes\n").unwrap();
        drop(raw);

        let mut store = fx.open();
        let loaded = store.load_all();
        assert_eq!(texts(&loaded), vec!["kept\n"]);
        assert_eq!(std::fs::metadata(fx.data_path()).unwrap().len(), 5);

        let mut next = Entry::capture("next", None);
        store.append_entry(&mut next);
        assert_eq!(next.location().unwrap().offset, 5);
    }

    #[test]
    fn test_load_with_empty_index_empties_log() {
        let fx = Fixture::new();
        std::fs::write(fx.data_path(), b"stale").unwrap();

        let loaded = fx.open().load_all();
        assert!(loaded.is_empty());
        assert_eq!(std::fs::metadata(fx.data_path()).unwrap().len(), 0);
    }

    #[test]
    fn test_load_skips_record_past_end_and_resyncs_index() {
        let fx = Fixture::new();
        {
            let mut store = fx.open();
            store.append_entry(&mut Entry::capture("a", None));
            store.append_entry(&mut Entry::capture("b", None));
        }
        // Lose the second entry's bytes.
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(fx.data_path())
            .unwrap();
        file.set_len(2).unwrap();
        drop(file);

        let mut store = fx.open();
        let loaded = store.load_all();
        assert_eq!(texts(&loaded), vec!["a\n"]);
        assert_eq!(store.record_count(), 1);
        assert_eq!(fx.open().record_count(), 1);
    }

    #[test]
    fn test_load_skips_overflowing_record() {
        let fx = Fixture::new();
        std::fs::write(fx.data_path(), b"ok\n").unwrap();
        let index = serde_json::json!({
            "root": "clipon_history",
            "version": "0.1.0",
            "clips": [
                { "time": "2024-05-01T10:00:00Z", "offset": 0, "length": 3 },
                { "time": "2024-05-01T10:00:01Z", "offset": u64::MAX, "length": 2 },
            ],
        });
        std::fs::write(fx.meta_path(), index.to_string()).unwrap();

        let mut store = fx.open();
        let loaded = store.load_all();
        assert_eq!(texts(&loaded), vec!["ok\n"]);
        assert_eq!(store.record_count(), 1);
        assert_eq!(std::fs::metadata(fx.data_path()).unwrap().len(), 3);
        assert_eq!(fx.open().record_count(), 1);
    }

    #[test]
    fn test_compact_rewrites_survivors() {
        let fx = Fixture::new();
        let mut store = fx.open();
        let mut entries: Vec<Entry> = ["a", "bb", "ccc"]
            .iter()
            .map(|t| Entry::capture(t, None))
            .collect();
        for entry in &mut entries {
            store.append_entry(entry);
        }

        entries.remove(0);
        assert_eq!(store.compact(&mut entries), 2);
        assert_eq!(entries[0].location(), Some(LogSpan { offset: 0, length: 3 }));
        assert_eq!(entries[1].location(), Some(LogSpan { offset: 3, length: 4 }));
        assert_eq!(std::fs::read(fx.data_path()).unwrap(), b"bb\nccc\n");

        let reloaded = fx.open().load_all();
        assert_eq!(texts(&reloaded), vec!["bb\n", "ccc\n"]);
    }

    #[test]
    fn test_compact_is_idempotent() {
        let fx = Fixture::new();
        let mut store = fx.open();
        let mut entries = vec![Entry::capture("x", None), Entry::capture("y", None)];

        store.compact(&mut entries);
        let data_once = std::fs::read(fx.data_path()).unwrap();
        let meta_once = std::fs::read(fx.meta_path()).unwrap();

        store.compact(&mut entries);
        assert_eq!(std::fs::read(fx.data_path()).unwrap(), data_once);
        assert_eq!(std::fs::read(fx.meta_path()).unwrap(), meta_once);
    }

    #[test]
    fn test_clear() {
        let fx = Fixture::new();
        let mut store = fx.open();
        store.append_entry(&mut Entry::capture("gone", None));

        assert!(store.clear());
        assert_eq!(store.record_count(), 0);
        assert_eq!(store.info().data_bytes, 0);
        assert!(fx.open().load_all().is_empty());
    }

    #[test]
    fn test_info() {
        let fx = Fixture::new();
        let mut store = fx.open();
        store.append_entry(&mut Entry::capture("1234", None));

        let info = store.info();
        assert_eq!(info.data_file, fx.data_path());
        assert_eq!(info.meta_file, fx.meta_path());
        assert_eq!(info.data_bytes, 5);
        assert_eq!(info.records, 1);
    }

    #[test]
    fn test_open_rejects_foreign_index() {
        let fx = Fixture::new();
        std::fs::write(fx.meta_path(), r#"{"root": "notes"}"#).unwrap();

        let result = PersistentHistory::open(fx.data_path(), fx.meta_path());
        assert!(matches!(result, Err(crate::Error::MetaFormat { .. })));
        // The content log is never created when the index is rejected.
        assert!(!fx.data_path().exists());
    }
}
