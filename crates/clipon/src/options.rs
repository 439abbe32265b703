//! Runtime history options and their backing file.
//!
//! Three options can be changed while the daemon runs: `autosave`,
//! `max_entry` and `max_length`. [`ConfigStore`] holds their current values
//! and rewrites `clipon.conf` after every accepted change. Validation and
//! side effects of a change belong to the history layer, see
//! [`crate::history::HistoryManager::configure`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// An upper bound that may be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<usize>", into = "Option<usize>")]
pub enum Limit {
    /// No bound.
    #[default]
    Unbounded,
    /// At most this many.
    AtMost(usize),
}

impl Limit {
    /// Whether `n` is over this limit.
    #[must_use]
    pub fn exceeded_by(self, n: usize) -> bool {
        match self {
            Self::Unbounded => false,
            Self::AtMost(max) => n > max,
        }
    }

    /// The bound as a number, `None` when unbounded.
    #[must_use]
    pub fn get(self) -> Option<usize> {
        self.into()
    }
}

impl From<Option<usize>> for Limit {
    fn from(value: Option<usize>) -> Self {
        value.map_or(Self::Unbounded, Self::AtMost)
    }
}

impl From<Limit> for Option<usize> {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Unbounded => None,
            Limit::AtMost(n) => Some(n),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::AtMost(n) => write!(f, "{n}"),
        }
    }
}

/// Names of the runtime options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    /// Flush every mutation to disk immediately.
    Autosave,
    /// Maximum number of retained entries.
    MaxEntry,
    /// Maximum number of characters kept from a clip.
    MaxLength,
}

impl OptionKey {
    /// All keys, in display order.
    pub const ALL: [Self; 3] = [Self::Autosave, Self::MaxEntry, Self::MaxLength];

    /// The name used in the options file and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Autosave => "autosave",
            Self::MaxEntry => "max_entry",
            Self::MaxLength => "max_length",
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "autosave" => Ok(Self::Autosave),
            "max_entry" | "max-entry" => Ok(Self::MaxEntry),
            "max_length" | "max-length" => Ok(Self::MaxLength),
            other => Err(Error::UnknownOption(other.to_string())),
        }
    }
}

/// A typed option value, ready to hand to a setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    /// New `autosave` flag.
    Autosave(bool),
    /// New `max_entry` bound.
    MaxEntry(Limit),
    /// New `max_length` bound.
    MaxLength(Limit),
}

impl OptionValue {
    /// The key this value belongs to.
    #[must_use]
    pub const fn key(self) -> OptionKey {
        match self {
            Self::Autosave(_) => OptionKey::Autosave,
            Self::MaxEntry(_) => OptionKey::MaxEntry,
            Self::MaxLength(_) => OptionKey::MaxLength,
        }
    }

    /// Parse a textual value for `key`.
    ///
    /// Booleans accept `true`/`false` in any case. Limits accept a
    /// non-negative integer or one of `unbounded`, `unlimited`, `none`.
    /// Range checks (such as rejecting zero) are left to the setter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptionValue`] if the text doesn't parse.
    pub fn parse(key: OptionKey, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match key {
            OptionKey::Autosave => match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(Self::Autosave(true)),
                "false" => Ok(Self::Autosave(false)),
                _ => Err(Error::invalid_option(
                    key.as_str(),
                    raw,
                    "expected true or false",
                )),
            },
            OptionKey::MaxEntry => parse_limit(key, raw).map(Self::MaxEntry),
            OptionKey::MaxLength => parse_limit(key, raw).map(Self::MaxLength),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Autosave(on) => write!(f, "{}={on}", self.key()),
            Self::MaxEntry(limit) | Self::MaxLength(limit) => write!(f, "{}={limit}", self.key()),
        }
    }
}

fn parse_limit(key: OptionKey, raw: &str) -> Result<Limit> {
    match raw.to_ascii_lowercase().as_str() {
        "unbounded" | "unlimited" | "none" => Ok(Limit::Unbounded),
        digits => digits.parse::<usize>().map(Limit::AtMost).map_err(|_| {
            Error::invalid_option(key.as_str(), raw, "expected an integer or 'unbounded'")
        }),
    }
}

/// Persisted option values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Flush every mutation to disk immediately.
    pub autosave: bool,
    /// Maximum number of retained entries.
    pub max_entry: Limit,
    /// Maximum number of characters kept from a clip.
    pub max_length: Limit,
    /// Keys this version doesn't know, carried through unchanged.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            autosave: true,
            max_entry: Limit::Unbounded,
            max_length: Limit::Unbounded,
            extra: BTreeMap::new(),
        }
    }
}

/// The runtime options together with the file that backs them.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    options: Options,
}

impl ConfigStore {
    /// Open the options file at `path`.
    ///
    /// A missing file is created with default values. Known keys in an
    /// existing file override the defaults; unknown keys are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file can't be read or isn't valid
    /// JSON, or if a missing file can't be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let options = if path.is_file() {
            let raw = std::fs::read_to_string(&path).map_err(|source| Error::FileOpen {
                path: path.clone(),
                source,
            })?;
            let options: Options = serde_json::from_str(&raw)?;
            info!(path = %path.display(), ?options, "Loaded options");
            options
        } else {
            Options::default()
        };

        let store = Self { path, options };
        store.write()?;
        Ok(store)
    }

    /// Build a store that starts from `options` without reading a file.
    #[must_use]
    pub fn with_options(path: impl Into<PathBuf>, options: Options) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current values.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Current value of `key`.
    #[must_use]
    pub fn get(&self, key: OptionKey) -> OptionValue {
        match key {
            OptionKey::Autosave => OptionValue::Autosave(self.options.autosave),
            OptionKey::MaxEntry => OptionValue::MaxEntry(self.options.max_entry),
            OptionKey::MaxLength => OptionValue::MaxLength(self.options.max_length),
        }
    }

    /// Whether autosave is on.
    #[must_use]
    pub fn autosave(&self) -> bool {
        self.options.autosave
    }

    /// Current `max_entry`.
    #[must_use]
    pub fn max_entry(&self) -> Limit {
        self.options.max_entry
    }

    /// Current `max_length`.
    #[must_use]
    pub fn max_length(&self) -> Limit {
        self.options.max_length
    }

    /// Store `value` and rewrite the backing file.
    ///
    /// No validation happens here. A failed write is logged; the in-memory
    /// value is kept and will be written with the next change.
    pub fn set(&mut self, value: OptionValue) {
        match value {
            OptionValue::Autosave(on) => self.options.autosave = on,
            OptionValue::MaxEntry(limit) => self.options.max_entry = limit,
            OptionValue::MaxLength(limit) => self.options.max_length = limit,
        }

        if let Err(e) = self.write() {
            warn!(error = %e, path = %self.path.display(), "Failed to save options");
        }
    }

    fn write(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.options)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path).map_err(|source| Error::FileOpen {
            path: self.path.clone(),
            source,
        })?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        debug!(path = %self.path.display(), "Saved options");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_key_from_str() {
        assert_eq!("autosave".parse::<OptionKey>().unwrap(), OptionKey::Autosave);
        assert_eq!("max_entry".parse::<OptionKey>().unwrap(), OptionKey::MaxEntry);
        assert_eq!("max-length".parse::<OptionKey>().unwrap(), OptionKey::MaxLength);

        let err = "colour".parse::<OptionKey>().unwrap_err();
        assert!(matches!(err, Error::UnknownOption(name) if name == "colour"));
    }

    #[test]
    fn test_option_key_round_trips_its_name() {
        for key in OptionKey::ALL {
            assert_eq!(key.as_str().parse::<OptionKey>().unwrap(), key);
        }
    }

    #[test]
    fn test_parse_autosave() {
        assert_eq!(
            OptionValue::parse(OptionKey::Autosave, "True").unwrap(),
            OptionValue::Autosave(true)
        );
        assert_eq!(
            OptionValue::parse(OptionKey::Autosave, "false").unwrap(),
            OptionValue::Autosave(false)
        );
        assert!(OptionValue::parse(OptionKey::Autosave, "yes").is_err());
    }

    #[test]
    fn test_parse_limits() {
        assert_eq!(
            OptionValue::parse(OptionKey::MaxEntry, "10").unwrap(),
            OptionValue::MaxEntry(Limit::AtMost(10))
        );
        assert_eq!(
            OptionValue::parse(OptionKey::MaxLength, "unbounded").unwrap(),
            OptionValue::MaxLength(Limit::Unbounded)
        );
        // Zero parses; the setter is what rejects it.
        assert_eq!(
            OptionValue::parse(OptionKey::MaxEntry, "0").unwrap(),
            OptionValue::MaxEntry(Limit::AtMost(0))
        );
        assert!(OptionValue::parse(OptionKey::MaxEntry, "-3").is_err());
        assert!(OptionValue::parse(OptionKey::MaxLength, "lots").is_err());
    }

    #[test]
    fn test_limit_exceeded_by() {
        assert!(!Limit::Unbounded.exceeded_by(usize::MAX));
        assert!(!Limit::AtMost(3).exceeded_by(3));
        assert!(Limit::AtMost(3).exceeded_by(4));
    }

    #[test]
    fn test_limit_serializes_as_nullable_number() {
        assert_eq!(serde_json::to_string(&Limit::Unbounded).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Limit::AtMost(7)).unwrap(), "7");
        assert_eq!(
            serde_json::from_str::<Limit>("12").unwrap(),
            Limit::AtMost(12)
        );
    }

    #[test]
    fn test_open_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipon.conf");

        let store = ConfigStore::open(&path).unwrap();
        assert!(store.autosave());
        assert_eq!(store.max_entry(), Limit::Unbounded);
        assert!(path.exists());
    }

    #[test]
    fn test_open_known_keys_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipon.conf");
        std::fs::write(&path, r#"{"autosave": false, "max_entry": 5}"#).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        assert!(!store.autosave());
        assert_eq!(store.max_entry(), Limit::AtMost(5));
        assert_eq!(store.max_length(), Limit::Unbounded);
    }

    #[test]
    fn test_unknown_keys_survive_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipon.conf");
        std::fs::write(&path, r#"{"theme": "dark", "max_length": 80}"#).unwrap();

        let mut store = ConfigStore::open(&path).unwrap();
        store.set(OptionValue::MaxEntry(Limit::AtMost(3)));

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.max_entry(), Limit::AtMost(3));
        assert_eq!(reopened.max_length(), Limit::AtMost(80));
        assert_eq!(
            reopened.options().extra.get("theme"),
            Some(&serde_json::Value::String("dark".to_string()))
        );
    }

    #[test]
    fn test_get_returns_typed_value() {
        let store = ConfigStore::with_options("/unused", Options::default());
        assert_eq!(
            store.get(OptionKey::Autosave),
            OptionValue::Autosave(true)
        );
        assert_eq!(
            store.get(OptionKey::MaxLength),
            OptionValue::MaxLength(Limit::Unbounded)
        );
    }

    #[test]
    fn test_set_keeps_value_when_write_fails() {
        let mut store = ConfigStore::with_options(
            "/nonexistent/dir/clipon.conf",
            Options::default(),
        );
        store.set(OptionValue::Autosave(false));
        assert!(!store.autosave());
    }

    #[test]
    fn test_open_invalid_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipon.conf");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(ConfigStore::open(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_option_value_display() {
        assert_eq!(
            OptionValue::MaxEntry(Limit::AtMost(4)).to_string(),
            "max_entry=4"
        );
        assert_eq!(OptionValue::Autosave(true).to_string(), "autosave=true");
    }
}
