//! Append-only content log.
//!
//! Clip text is stored as raw bytes, back to back. The log carries no
//! framing of its own: an entry is only reachable through the span recorded
//! for it in the index.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Error, Result};
use crate::history::LogSpan;

/// Handle to the content log, opened once for the life of the store.
#[derive(Debug)]
pub struct DataLog {
    path: PathBuf,
    file: File,
}

impl DataLog {
    /// Open or create the log at `path` with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let file = options.open(&path).map_err(|source| Error::FileOpen {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, file })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if file metadata can't be read.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Whether the log is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if file metadata can't be read.
    pub fn is_empty(&self) -> io::Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Write `bytes` at the current end of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if seeking or writing fails. Bytes from a failed
    /// write may remain at the tail; they are unreferenced.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<LogSpan> {
        let span = self.write(bytes)?;
        self.sync()?;
        Ok(span)
    }

    /// Like [`append`](Self::append), without syncing.
    ///
    /// Callers batching several writes follow up with one [`sync`](Self::sync).
    ///
    /// # Errors
    ///
    /// Returns an error if seeking or writing fails.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<LogSpan> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(bytes)?;
        self.file.flush()?;

        let span = LogSpan {
            offset,
            length: bytes.len() as u64,
        };
        trace!(offset = span.offset, length = span.length, "Wrote to data log");
        Ok(span)
    }

    /// Flush written bytes to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Read the bytes covered by `span`.
    ///
    /// # Errors
    ///
    /// Returns an error if the span is not addressable, reaches past the
    /// end of the log, or the read fails.
    pub fn read(&mut self, span: LogSpan) -> io::Result<Vec<u8>> {
        let length = usize::try_from(span.length)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "span too large"))?;
        let end = span.end().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("span {}+{} overflows", span.offset, span.length),
            )
        })?;

        if end > self.len()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("span {}+{} past end of log", span.offset, span.length),
            ));
        }

        let mut buf = vec![0; length];
        self.file.seek(SeekFrom::Start(span.offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Cut the log to `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be resized.
    pub fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.file.seek(SeekFrom::Start(len))?;
        self.file.sync_data()
    }
}
