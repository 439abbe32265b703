//! Clip history policy.
//!
//! [`HistoryManager`] owns the in-memory [`HistoryIndex`], the on-disk
//! [`PersistentHistory`] and the runtime [`ConfigStore`], and is the only
//! thing that mutates any of them. It enforces the retention limits:
//!
//! - at most `max_entry` entries, oldest evicted first;
//! - at most `max_length` characters kept from each new clip.
//!
//! With `autosave` on, every mutation is flushed before the call returns:
//! additions as a single append, removals as a full compaction.

pub mod entry;
pub mod index;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::options::{ConfigStore, Limit, OptionKey, OptionValue};
use crate::storage::PersistentHistory;

pub use entry::{Entry, EntryView, LogSpan, SEPARATOR};
pub use index::HistoryIndex;

/// The clip history and everything that governs it.
#[derive(Debug)]
pub struct HistoryManager {
    index: HistoryIndex,
    store: PersistentHistory,
    options: ConfigStore,
}

impl HistoryManager {
    /// Build a manager over `store`, loading whatever it holds.
    ///
    /// Limits read from the options file that could never have been set
    /// through [`configure`](Self::configure) (a zero bound) are reset to
    /// unbounded. If the loaded history is longer than `max_entry` the oldest
    /// entries are evicted.
    #[must_use]
    pub fn open(mut store: PersistentHistory, mut options: ConfigStore) -> Self {
        for key in [OptionKey::MaxEntry, OptionKey::MaxLength] {
            let reset = match options.get(key) {
                OptionValue::MaxEntry(Limit::AtMost(0)) => OptionValue::MaxEntry(Limit::Unbounded),
                OptionValue::MaxLength(Limit::AtMost(0)) => {
                    OptionValue::MaxLength(Limit::Unbounded)
                }
                _ => continue,
            };
            warn!(option = %key, "Ignoring zero limit from options file");
            options.set(reset);
        }

        let index: HistoryIndex = store.load_all().into_iter().collect();
        info!(entries = index.len(), "History loaded");

        let mut manager = Self {
            index,
            store,
            options,
        };

        if let Limit::AtMost(max) = manager.options.max_entry() {
            let excess = manager.size().saturating_sub(max);
            if excess > 0 {
                manager.delete_range(0, excess);
            }
        }

        manager
    }

    /// Number of entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.index.len()
    }

    /// Entry at `index`, oldest being 0.
    #[must_use]
    pub fn get_entry(&self, index: usize) -> Option<&Entry> {
        self.index.get(index)
    }

    /// Iterate entries oldest to newest.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.index.iter()
    }

    /// The runtime options.
    #[must_use]
    pub fn options(&self) -> &ConfigStore {
        &self.options
    }

    /// Record a newly captured clip.
    ///
    /// The text is cut to `max_length` characters and the separator is
    /// appended. Oldest entries are evicted until there is room under
    /// `max_entry`.
    pub fn add_text(&mut self, text: &str) {
        let entry = Entry::capture(text, self.options.max_length().get());

        if let Limit::AtMost(max) = self.options.max_entry() {
            let excess = (self.size() + 1).saturating_sub(max);
            if excess > 0 {
                debug!(evicted = excess, "Evicting oldest entries");
                self.index.evict_oldest(excess);
                if self.options.autosave() {
                    self.persist_all();
                }
            }
        }

        self.index.push(entry);

        if self.options.autosave() {
            if let Some(entry) = self.index.newest_mut() {
                self.store.append_entry(entry);
            }
        }
        debug!(size = self.size(), "Added entry");
    }

    /// Remove entries `start..end`.
    ///
    /// `end` is clamped to the history size. The call is ignored (and
    /// returns `false`) if `start` is not a valid index or `start > end`.
    /// An empty range is accepted and touches nothing.
    pub fn delete_range(&mut self, start: usize, end: usize) -> bool {
        let size = self.size();
        if start >= size || start > end {
            debug!(start, end, size, "Ignoring invalid delete range");
            return false;
        }
        if start == end {
            return true;
        }

        let end = end.min(size);
        self.index.remove_range(start..end);
        info!(start, end, "Deleted history entries");

        if self.options.autosave() {
            self.persist_all();
        }
        true
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.index.clear();
        if self.options.autosave() {
            self.store.clear();
        }
        info!("Cleared history");
    }

    /// Write entries `start..end` to disk, replacing what is there.
    ///
    /// Runs regardless of `autosave`. Entries outside the range are left
    /// without a location. Returns `false`, doing nothing, unless
    /// `start <= end <= size`.
    pub fn save(&mut self, start: usize, end: usize) -> bool {
        let size = self.size();
        if start > end || end > size {
            debug!(start, end, size, "Ignoring invalid save range");
            return false;
        }

        let (head, rest) = self.index.as_mut_slice().split_at_mut(start);
        let (range, tail) = rest.split_at_mut(end - start);
        for entry in head.iter_mut().chain(tail.iter_mut()) {
            entry.set_location(None);
        }
        let written = self.store.compact(range);
        info!(start, end, written, "Saved history");
        true
    }

    /// Write the whole history to disk.
    pub fn save_all(&mut self) -> bool {
        self.save(0, self.size())
    }

    /// Apply a new option value.
    ///
    /// - enabling `autosave` first writes the whole history;
    /// - lowering `max_entry` below the current size evicts the oldest
    ///   entries before the new bound is stored;
    /// - `max_length` only affects clips captured afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptionValue`] for a zero `max_entry` or
    /// `max_length`; nothing is changed in that case.
    pub fn configure(&mut self, value: OptionValue) -> Result<()> {
        match value {
            OptionValue::Autosave(on) => {
                if on {
                    self.save_all();
                }
            }
            OptionValue::MaxEntry(limit) => {
                if let Limit::AtMost(max) = limit {
                    if max == 0 {
                        return Err(Error::invalid_option(
                            "max_entry",
                            "0",
                            "must be greater than zero",
                        ));
                    }
                    let excess = self.size().saturating_sub(max);
                    if excess > 0 {
                        self.delete_range(0, excess);
                    }
                }
            }
            OptionValue::MaxLength(limit) => {
                if limit == Limit::AtMost(0) {
                    return Err(Error::invalid_option(
                        "max_length",
                        "0",
                        "must be greater than zero",
                    ));
                }
            }
        }

        self.options.set(value);
        info!(%value, "Option updated");
        Ok(())
    }

    /// Summary of options, storage and contents.
    #[must_use]
    pub fn info(&self) -> HistoryInfo {
        let storage = self.store.info();
        HistoryInfo {
            size: self.size(),
            autosave: self.options.autosave(),
            max_entry: self.options.max_entry(),
            max_length: self.options.max_length(),
            data_file: storage.data_file,
            meta_file: storage.meta_file,
            data_bytes: storage.data_bytes,
            oldest: self.index.oldest().map(Entry::timestamp),
            newest: self.index.newest().map(Entry::timestamp),
        }
    }

    fn persist_all(&mut self) {
        self.store.compact(self.index.as_mut_slice());
    }
}

/// History summary reported by `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryInfo {
    /// Number of entries.
    pub size: usize,
    /// Current `autosave`.
    pub autosave: bool,
    /// Current `max_entry`.
    pub max_entry: Limit,
    /// Current `max_length`.
    pub max_length: Limit,
    /// Content log path.
    pub data_file: PathBuf,
    /// Index path.
    pub meta_file: PathBuf,
    /// Content log size in bytes.
    pub data_bytes: u64,
    /// Capture time of the oldest entry.
    pub oldest: Option<DateTime<Utc>>,
    /// Capture time of the newest entry.
    pub newest: Option<DateTime<Utc>>,
}
