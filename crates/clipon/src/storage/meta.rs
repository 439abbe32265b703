//! Structured index over the content log.
//!
//! The index is a small JSON document:
//!
//! ```json
//! {
//!   "root": "clipon_history",
//!   "version": "0.1.0",
//!   "clips": [
//!     { "time": "2024-05-01T10:00:00Z", "offset": 0, "length": 6 }
//!   ]
//! }
//! ```
//!
//! It is rewritten in full on every change, through a temporary file and a
//! rename, so a crash leaves either the old or the new document.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::history::LogSpan;

/// Tag identifying a clipon index document.
pub const ROOT_TAG: &str = "clipon_history";

/// Format version written into new documents.
pub const FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One index record per retained entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    /// Capture time.
    pub time: DateTime<Utc>,
    /// Byte offset in the content log.
    pub offset: u64,
    /// Byte length in the content log.
    pub length: u64,
}

impl MetaRecord {
    /// Record for an entry written at `span`.
    #[must_use]
    pub fn new(time: DateTime<Utc>, span: LogSpan) -> Self {
        Self {
            time,
            offset: span.offset,
            length: span.length,
        }
    }

    /// The content log span this record points at.
    #[must_use]
    pub fn span(&self) -> LogSpan {
        LogSpan {
            offset: self.offset,
            length: self.length,
        }
    }
}

#[derive(Serialize)]
struct DocumentOut<'a> {
    root: &'static str,
    version: &'static str,
    clips: &'a [MetaRecord],
}

#[derive(Deserialize)]
struct DocumentIn {
    root: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    clips: Vec<serde_json::Value>,
}

/// The index file and its in-memory records.
#[derive(Debug)]
pub struct MetaStore {
    path: PathBuf,
    records: Vec<MetaRecord>,
    skipped: usize,
}

impl MetaStore {
    /// Open the index at `path`.
    ///
    /// A missing or empty file yields an empty index, which is written out
    /// immediately. Records that don't parse are skipped and counted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetaFormat`] if the file holds something other than a
    /// clipon index, and an I/O error if it can't be read or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(Error::FileOpen { path, source }),
        };

        if raw.trim().is_empty() {
            debug!(path = %path.display(), "Creating empty history index");
            let store = Self {
                path,
                records: Vec::new(),
                skipped: 0,
            };
            store.write()?;
            return Ok(store);
        }

        let document: DocumentIn =
            serde_json::from_str(&raw).map_err(|e| Error::MetaFormat {
                path: path.clone(),
                message: e.to_string(),
            })?;

        if document.root != ROOT_TAG {
            return Err(Error::MetaFormat {
                path,
                message: format!("root tag '{}', expected '{ROOT_TAG}'", document.root),
            });
        }

        if document.version.as_deref() != Some(FORMAT_VERSION) {
            debug!(
                found = ?document.version,
                current = FORMAT_VERSION,
                "History index written by another version"
            );
        }

        let mut records = Vec::with_capacity(document.clips.len());
        let mut skipped = 0;
        for (position, value) in document.clips.into_iter().enumerate() {
            match serde_json::from_value::<MetaRecord>(value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(position, error = %e, "Skipping malformed index record");
                    skipped += 1;
                }
            }
        }

        info!(
            path = %path.display(),
            records = records.len(),
            skipped,
            "Loaded history index"
        );
        Ok(Self {
            path,
            records,
            skipped,
        })
    }

    /// Path of the index file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records in order.
    #[must_use]
    pub fn records(&self) -> &[MetaRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// How many records failed to parse when the file was opened.
    #[must_use]
    pub fn skipped_on_open(&self) -> usize {
        self.skipped
    }

    /// Append a record and rewrite the file.
    ///
    /// On failure the record is dropped again so memory matches disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be written.
    pub fn push(&mut self, record: MetaRecord) -> Result<()> {
        self.records.push(record);
        if let Err(e) = self.write() {
            self.records.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Replace every record and rewrite the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be written. The in-memory records
    /// are replaced regardless.
    pub fn replace_all(&mut self, records: Vec<MetaRecord>) -> Result<()> {
        self.records = records;
        self.write()
    }

    /// Reset to an empty root and rewrite the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be written.
    pub fn reset(&mut self) -> Result<()> {
        self.replace_all(Vec::new())
    }

    fn write(&self) -> Result<()> {
        let document = DocumentOut {
            root: ROOT_TAG,
            version: FORMAT_VERSION,
            clips: &self.records,
        };
        let json = serde_json::to_vec_pretty(&document)?;

        let tmp_path = self.path.with_extension("json.tmp");
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp_path).map_err(|source| Error::FileOpen {
            path: tmp_path.clone(),
            source,
        })?;
        file.write_all(&json)?;
        file.write_all(b"\n")?;
        file.sync_data()?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
