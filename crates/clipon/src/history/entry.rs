//! A single captured clip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Appended to every clip at capture time.
pub const SEPARATOR: char = '\n';

/// Byte range of an entry inside the content log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSpan {
    /// Byte offset of the first byte.
    pub offset: u64,
    /// Number of bytes.
    pub length: u64,
}

impl LogSpan {
    /// One past the last byte, or `None` if that overflows.
    #[must_use]
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }
}

/// One captured clip.
///
/// Text and timestamp are fixed at creation. `location` is `None` until the
/// entry has been written to the content log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    text: String,
    timestamp: DateTime<Utc>,
    location: Option<LogSpan>,
}

impl Entry {
    /// Build an entry from captured text.
    ///
    /// The text is cut to `max_chars` characters when given, then the
    /// separator is appended.
    #[must_use]
    pub fn capture(text: &str, max_chars: Option<usize>) -> Self {
        let kept = match max_chars {
            Some(max) => truncate_chars(text, max),
            None => text,
        };

        let mut text = String::with_capacity(kept.len() + SEPARATOR.len_utf8());
        text.push_str(kept);
        text.push(SEPARATOR);

        Self {
            text,
            timestamp: Utc::now(),
            location: None,
        }
    }

    /// Rebuild an entry that was read back from disk.
    #[must_use]
    pub fn restored(text: String, timestamp: DateTime<Utc>, location: LogSpan) -> Self {
        Self {
            text,
            timestamp,
            location: Some(location),
        }
    }

    /// The stored text, separator included.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// When the clip was captured.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Where the entry lives in the content log, if it has been written.
    #[must_use]
    pub fn location(&self) -> Option<LogSpan> {
        self.location
    }

    /// Whether the entry has been written to the content log.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.location.is_some()
    }

    /// Length of the encoded text in bytes.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        self.text.len() as u64
    }

    pub(crate) fn set_location(&mut self, location: Option<LogSpan>) {
        self.location = location;
    }
}

/// The longest prefix of `text` holding at most `max` characters.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// What a client sees of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryView {
    /// Capture time.
    pub time: DateTime<Utc>,
    /// Stored text, separator included.
    pub text: String,
}

impl From<&Entry> for EntryView {
    fn from(entry: &Entry) -> Self {
        Self {
            time: entry.timestamp,
            text: entry.text.clone(),
        }
    }
}
