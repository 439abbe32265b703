//! Single-instance guard.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// An exclusive advisory lock on a fixed file.
///
/// Held for the life of the daemon. The lock file carries the holder's pid
/// for diagnostics; the lock itself is what counts.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    file: Option<File>,
}

impl InstanceLock {
    /// Take the lock at `path` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstanceLocked`] if another holder has it, or
    /// [`Error::FileOpen`] if the lock file can't be opened.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path).map_err(|source| Error::FileOpen {
            path: path.clone(),
            source,
        })?;

        if FileExt::try_lock_exclusive(&file).is_err() {
            return Err(Error::InstanceLocked { path });
        }

        if let Err(e) = file
            .set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()))
        {
            warn!(error = %e, path = %path.display(), "Failed to record pid in lock file");
        }

        debug!(path = %path.display(), "Acquired instance lock");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Give the lock up. Also happens on drop.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                warn!(error = %e, path = %self.path.display(), "Failed to release instance lock");
            } else {
                debug!(path = %self.path.display(), "Released instance lock");
            }
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}
