//! Error types for clipon.
//!
//! Startup failures (lock held elsewhere, unreadable index) are fatal.
//! Everything that happens once the daemon is serving is either logged and
//! absorbed by the store, or reported back to the client as a rejection.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for clipon operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Startup Errors ===
    /// Another daemon instance already holds the singleton lock.
    #[error("another instance holds the lock at {path}")]
    InstanceLocked {
        /// Path to the lock file.
        path: PathBuf,
    },

    /// The history index file exists but is not a clipon index.
    #[error("unrecognized history index {path}: {message}")]
    MetaFormat {
        /// Path to the index file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// Failed to open a file the store depends on.
    #[error("failed to open {path}: {source}")]
    FileOpen {
        /// Path that couldn't be opened.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// The option name is not one the daemon knows.
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    /// The option exists but the value was rejected.
    #[error("invalid value '{value}' for option '{key}': {reason}")]
    InvalidOptionValue {
        /// Option name.
        key: &'static str,
        /// The rejected value, as given.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    // === Capture Errors ===
    /// A capture source failed.
    #[error("capture source '{name}' failed: {message}")]
    CaptureSource {
        /// Name of the capture source.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === IPC Errors ===
    /// Failed to connect to the daemon.
    #[error("failed to connect to daemon at {path}: {message}")]
    DaemonConnect {
        /// Path to the socket file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// The daemon is not running.
    #[error("daemon is not running")]
    DaemonNotRunning,

    /// IPC communication failed.
    #[error("IPC error: {0}")]
    Ipc(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },
}

/// A specialized Result type for clipon operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new IPC error.
    #[must_use]
    pub fn ipc(message: impl Into<String>) -> Self {
        Self::Ipc(message.into())
    }

    /// Create a capture source error.
    #[must_use]
    pub fn capture_source(name: &'static str, message: impl Into<String>) -> Self {
        Self::CaptureSource {
            name,
            message: message.into(),
        }
    }

    /// Create an invalid option value error.
    #[must_use]
    pub fn invalid_option(
        key: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOptionValue {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates the daemon is not running.
    #[must_use]
    pub fn is_daemon_not_running(&self) -> bool {
        matches!(self, Self::DaemonNotRunning)
    }

    /// Check if this error must abort daemon startup.
    #[must_use]
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            Self::InstanceLocked { .. }
                | Self::MetaFormat { .. }
                | Self::FileOpen { .. }
                | Self::DirectoryCreate { .. }
                | Self::ConfigLoad(_)
                | Self::ConfigValidation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DaemonNotRunning;
        assert_eq!(err.to_string(), "daemon is not running");

        let err = Error::UnknownOption("colour".to_string());
        assert_eq!(err.to_string(), "unknown option 'colour'");
    }

    #[test]
    fn test_error_is_daemon_not_running() {
        assert!(Error::DaemonNotRunning.is_daemon_not_running());
        assert!(!Error::ipc("test").is_daemon_not_running());
    }

    #[test]
    fn test_instance_locked_display() {
        let err = Error::InstanceLocked {
            path: PathBuf::from("/tmp/clipon.lock"),
        };
        assert!(err.to_string().contains("/tmp/clipon.lock"));
        assert!(err.is_fatal_startup());
    }

    #[test]
    fn test_meta_format_is_fatal() {
        let err = Error::MetaFormat {
            path: PathBuf::from("/data/clipon.json"),
            message: "root tag 'other'".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/clipon.json"));
        assert!(msg.contains("root tag"));
        assert!(err.is_fatal_startup());
    }

    #[test]
    fn test_request_errors_are_not_fatal() {
        assert!(!Error::UnknownOption("x".to_string()).is_fatal_startup());
        assert!(!Error::invalid_option("max_entry", "0", "must be positive").is_fatal_startup());
        assert!(!Error::DaemonNotRunning.is_fatal_startup());
    }

    #[test]
    fn test_invalid_option_display() {
        let err = Error::invalid_option("max_entry", "0", "must be greater than zero");
        let msg = err.to_string();
        assert!(msg.contains("max_entry"));
        assert!(msg.contains("'0'"));
        assert!(msg.contains("greater than zero"));
    }

    #[test]
    fn test_ipc_error() {
        let err = Error::ipc("connection refused");
        assert_eq!(err.to_string(), "IPC error: connection refused");
    }

    #[test]
    fn test_capture_source_error() {
        let err = Error::capture_source("clipboard", "no display");
        let msg = err.to_string();
        assert!(msg.contains("clipboard"));
        assert!(msg.contains("no display"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_daemon_connect_error_display() {
        let err = Error::DaemonConnect {
            path: PathBuf::from("/tmp/test.sock"),
            message: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/test.sock"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = Error::Timeout {
            operation: "daemon startup".to_string(),
        };
        assert!(err.to_string().contains("daemon startup"));
    }
}
