//! In-memory ordered history.

use std::collections::VecDeque;
use std::ops::Range;

use super::entry::Entry;

/// Entries in insertion order, oldest first.
#[derive(Debug, Default)]
pub struct HistoryIndex {
    entries: VecDeque<Entry>,
}

impl HistoryIndex {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`, oldest being 0.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Oldest entry.
    #[must_use]
    pub fn oldest(&self) -> Option<&Entry> {
        self.entries.front()
    }

    /// Newest entry.
    #[must_use]
    pub fn newest(&self) -> Option<&Entry> {
        self.entries.back()
    }

    /// Append as the newest entry.
    pub fn push(&mut self, entry: Entry) {
        self.entries.push_back(entry);
    }

    /// Mutable access to the newest entry.
    pub fn newest_mut(&mut self) -> Option<&mut Entry> {
        self.entries.back_mut()
    }

    /// Drop the `count` oldest entries.
    pub fn evict_oldest(&mut self, count: usize) {
        let count = count.min(self.entries.len());
        self.entries.drain(..count);
    }

    /// Remove the entries in `range`. The range must be in bounds.
    pub fn remove_range(&mut self, range: Range<usize>) {
        self.entries.drain(range);
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// All entries as one mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [Entry] {
        self.entries.make_contiguous()
    }
}

impl FromIterator<Entry> for HistoryIndex {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(texts: &[&str]) -> HistoryIndex {
        texts.iter().map(|t| Entry::capture(t, None)).collect()
    }

    fn texts(index: &HistoryIndex) -> Vec<&str> {
        index.iter().map(Entry::text).collect()
    }

    #[test]
    fn test_push_keeps_insertion_order() {
        let mut index = HistoryIndex::new();
        index.push(Entry::capture("a", None));
        index.push(Entry::capture("b", None));

        assert_eq!(texts(&index), vec!["a\n", "b\n"]);
        assert_eq!(index.oldest().unwrap().text(), "a\n");
        assert_eq!(index.newest().unwrap().text(), "b\n");
    }

    #[test]
    fn test_evict_oldest() {
        let mut index = index_of(&["a", "b", "c"]);
        index.evict_oldest(2);
        assert_eq!(texts(&index), vec!["c\n"]);

        index.evict_oldest(10);
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_range() {
        let mut index = index_of(&["a", "b", "c", "d"]);
        index.remove_range(1..3);
        assert_eq!(texts(&index), vec!["a\n", "d\n"]);
    }

    #[test]
    fn test_get_out_of_bounds() {
        let index = index_of(&["a"]);
        assert!(index.get(0).is_some());
        assert!(index.get(1).is_none());
        assert!(HistoryIndex::new().get(0).is_none());
    }

    #[test]
    fn test_as_mut_slice_after_wraparound() {
        let mut index = index_of(&["a", "b"]);
        index.evict_oldest(1);
        index.push(Entry::capture("c", None));

        let slice = index.as_mut_slice();
        assert_eq!(slice.len(), 2);
        assert_eq!(slice[0].text(), "b\n");
        assert_eq!(slice[1].text(), "c\n");
    }
}
