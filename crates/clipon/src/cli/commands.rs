//! CLI command definitions.
//!
//! This module defines the arguments of each subcommand and the pure
//! parts of their behaviour, such as which entries `list` shows.

use std::ops::Range;

use clap::Args;
use thiserror::Error;

use crate::history::SEPARATOR;
use crate::options::{OptionKey, OptionValue};

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Number of entries to list. Defaults to all
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub number: Option<u64>,

    /// First entry to list. Negative values count back from the newest.
    /// Defaults to the last `--number` entries
    #[arg(short, long, allow_negative_numbers = true)]
    pub start: Option<i64>,

    /// List newest first
    #[arg(short, long)]
    pub reverse: bool,

    /// Print at most this many characters of each entry
    #[arg(long, value_name = "CHARS", value_parser = clap::value_parser!(u64).range(1..))]
    pub short: Option<u64>,

    /// Print entry text only, without index numbers
    #[arg(long)]
    pub raw: bool,
}

/// Why `list` has nothing to show.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    /// The history has no entries.
    #[error("History is empty")]
    Empty,

    /// The requested window doesn't overlap the history.
    #[error("Invalid range [{start}, {end}). Total is {size}")]
    InvalidRange {
        /// Resolved first index.
        start: usize,
        /// Resolved end index.
        end: usize,
        /// History size.
        size: usize,
    },
}

impl ListCommand {
    /// Resolve the arguments against a history of `size` entries.
    ///
    /// # Errors
    ///
    /// Returns [`ListError`] if the history is empty or the window is.
    pub fn window(&self, size: usize) -> Result<Range<usize>, ListError> {
        if size == 0 {
            return Err(ListError::Empty);
        }

        let requested = self.number.map_or(usize::MAX, saturating_usize);
        let number = requested.min(size);

        let start = match self.start {
            Some(start) if start >= 0 => saturating_usize(start.unsigned_abs()),
            Some(start) => size.saturating_sub(saturating_usize(start.unsigned_abs())),
            None => size.saturating_sub(requested),
        };
        let end = start.saturating_add(number).min(size);

        if start >= end {
            return Err(ListError::InvalidRange { start, end, size });
        }
        Ok(start..end)
    }

    /// Indices to fetch, in print order.
    ///
    /// # Errors
    ///
    /// See [`window`](Self::window).
    pub fn indices(&self, size: usize) -> Result<Vec<usize>, ListError> {
        let window = self.window(size)?;
        Ok(if self.reverse {
            window.rev().collect()
        } else {
            window.collect()
        })
    }

    /// Format one entry for printing, without a trailing newline.
    #[must_use]
    pub fn format_entry(&self, index: usize, text: &str) -> String {
        let text = text.strip_suffix(SEPARATOR).unwrap_or(text);
        let text = match self.short {
            Some(max) => {
                let max = saturating_usize(max);
                match text.char_indices().nth(max) {
                    Some((cut, _)) => &text[..cut],
                    None => text,
                }
            }
            None => text,
        };

        if self.raw {
            text.to_string()
        } else {
            format!("{index}: {text}")
        }
    }
}

fn saturating_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Delete command arguments.
#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// First entry to delete
    #[arg(short, long)]
    pub start: usize,

    /// Number of entries to delete
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
    pub number: u64,
}

impl DeleteCommand {
    /// The `(start, end)` pair to send.
    #[must_use]
    pub fn range(&self) -> (usize, usize) {
        let end = self.start.saturating_add(saturating_usize(self.number));
        (self.start, end)
    }
}

/// Config command arguments.
///
/// With no options given, the current values are shown.
#[derive(Debug, Args)]
pub struct ConfigCommand {
    /// Write every change to disk immediately (true or false)
    #[arg(long)]
    pub autosave: Option<String>,

    /// Maximum number of entries kept, or "unbounded". Older entries beyond
    /// the new limit are deleted
    #[arg(long, value_name = "NUMBER")]
    pub max_entry: Option<String>,

    /// Maximum number of characters kept from each new clip, or
    /// "unbounded". Existing entries are not changed
    #[arg(long, value_name = "NUMBER")]
    pub max_length: Option<String>,
}

impl ConfigCommand {
    /// The requested changes, in a fixed order, as raw key/value text.
    #[must_use]
    pub fn changes(&self) -> Vec<(OptionKey, &str)> {
        [
            (OptionKey::Autosave, &self.autosave),
            (OptionKey::MaxEntry, &self.max_entry),
            (OptionKey::MaxLength, &self.max_length),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|value| (key, value)))
        .collect()
    }

    /// Check every requested value parses before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns the first value that doesn't parse.
    pub fn validate(&self) -> crate::Result<()> {
        for (key, value) in self.changes() {
            OptionValue::parse(key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(number: Option<u64>, start: Option<i64>) -> ListCommand {
        ListCommand {
            number,
            start,
            reverse: false,
            short: None,
            raw: false,
        }
    }

    #[test]
    fn test_list_defaults_to_everything() {
        assert_eq!(list(None, None).window(5), Ok(0..5));
    }

    #[test]
    fn test_list_number_takes_newest() {
        assert_eq!(list(Some(2), None).window(5), Ok(3..5));
        assert_eq!(list(Some(10), None).window(5), Ok(0..5));
    }

    #[test]
    fn test_list_explicit_start() {
        assert_eq!(list(Some(2), Some(0)).window(5), Ok(0..2));
        assert_eq!(list(None, Some(3)).window(5), Ok(3..5));
    }

    #[test]
    fn test_list_negative_start_counts_from_tail() {
        assert_eq!(list(None, Some(-2)).window(5), Ok(3..5));
        assert_eq!(list(Some(1), Some(-2)).window(5), Ok(3..4));
        assert_eq!(list(None, Some(-50)).window(5), Ok(0..5));
    }

    #[test]
    fn test_list_errors() {
        assert_eq!(list(None, None).window(0), Err(ListError::Empty));
        assert_eq!(
            list(None, Some(5)).window(5),
            Err(ListError::InvalidRange {
                start: 5,
                end: 5,
                size: 5
            })
        );
    }

    #[test]
    fn test_list_reverse_order() {
        let mut cmd = list(Some(3), None);
        cmd.reverse = true;
        assert_eq!(cmd.indices(4), Ok(vec![3, 2, 1]));
    }

    #[test]
    fn test_format_entry() {
        let mut cmd = list(None, None);
        assert_eq!(cmd.format_entry(4, "hello\n"), "4: hello");

        cmd.short = Some(3);
        assert_eq!(cmd.format_entry(0, "héllo\n"), "0: hél");

        cmd.raw = true;
        assert_eq!(cmd.format_entry(0, "ab\n"), "ab");
    }

    #[test]
    fn test_delete_range() {
        let cmd = DeleteCommand {
            start: 2,
            number: 3,
        };
        assert_eq!(cmd.range(), (2, 5));
    }

    #[test]
    fn test_config_changes_and_validation() {
        let cmd = ConfigCommand {
            autosave: Some("false".to_string()),
            max_entry: None,
            max_length: Some("80".to_string()),
        };
        assert_eq!(
            cmd.changes(),
            vec![(OptionKey::Autosave, "false"), (OptionKey::MaxLength, "80")]
        );
        assert!(cmd.validate().is_ok());

        let bad = ConfigCommand {
            autosave: None,
            max_entry: Some("lots".to_string()),
            max_length: None,
        };
        assert!(bad.validate().is_err());
    }
}
