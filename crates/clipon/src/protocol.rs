//! Request/response messages exchanged between clients and the daemon.
//!
//! Each message is one JSON object on one line. Requests are tagged by
//! `method`, responses by `kind`:
//!
//! ```text
//! -> {"method":"delete_range","start":0,"end":1}
//! <- {"kind":"accepted","data":true}
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::daemon::MonitorState;
use crate::history::{EntryView, HistoryInfo};

/// A request to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    /// Current monitor state.
    GetStatus,
    /// Change a runtime option. Both fields are parsed by the daemon.
    Configure {
        /// Option name.
        key: String,
        /// New value, as text.
        value: String,
    },
    /// Daemon and history summary.
    GetInfo,
    /// Remove every entry.
    ClearHistory,
    /// Number of entries.
    HistorySize,
    /// One entry by index, oldest being 0.
    GetEntry {
        /// Entry index.
        index: usize,
    },
    /// Remove entries `start..end`.
    DeleteRange {
        /// First index removed.
        start: usize,
        /// One past the last index removed.
        end: usize,
    },
    /// Write the whole history to disk.
    SaveHistory,
    /// Stop recording captures.
    Pause,
    /// Resume recording captures.
    Resume,
    /// Shut the daemon down.
    Stop,
}

impl Request {
    /// The wire name of this request.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::GetStatus => "get_status",
            Self::Configure { .. } => "configure",
            Self::GetInfo => "get_info",
            Self::ClearHistory => "clear_history",
            Self::HistorySize => "history_size",
            Self::GetEntry { .. } => "get_entry",
            Self::DeleteRange { .. } => "delete_range",
            Self::SaveHistory => "save_history",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }
}

/// The daemon's answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Response {
    /// Monitor state.
    Status(MonitorState),
    /// Whether a mutating request was applied.
    Accepted(bool),
    /// Daemon summary.
    Info(Box<DaemonInfo>),
    /// History size.
    Size(usize),
    /// The requested entry, if it exists.
    Entry(Option<EntryView>),
    /// The request completed.
    Done,
    /// The request couldn't be decoded or carried out.
    Error {
        /// What went wrong.
        message: String,
    },
}

impl Response {
    /// An error response.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Answer to `get_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonInfo {
    /// Daemon process id.
    pub pid: u32,
    /// Daemon version.
    pub version: String,
    /// Monitor state.
    pub state: MonitorState,
    /// Service socket.
    pub socket: PathBuf,
    /// Singleton lock file.
    pub lock_file: PathBuf,
    /// Runtime options file.
    pub options_file: PathBuf,
    /// History summary.
    pub history: HistoryInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&Request::DeleteRange { start: 0, end: 1 }).unwrap();
        assert_eq!(json, r#"{"method":"delete_range","start":0,"end":1}"#);

        let json = serde_json::to_string(&Request::Pause).unwrap();
        assert_eq!(json, r#"{"method":"pause"}"#);
    }

    #[test]
    fn test_request_decode() {
        let request: Request =
            serde_json::from_str(r#"{"method":"configure","key":"max_entry","value":"5"}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::Configure {
                key: "max_entry".to_string(),
                value: "5".to_string(),
            }
        );
        assert_eq!(request.method(), "configure");
    }

    #[test]
    fn test_unknown_method_fails_to_decode() {
        assert!(serde_json::from_str::<Request>(r#"{"method":"format_disk"}"#).is_err());
    }

    #[test]
    fn test_response_wire_format() {
        let json = serde_json::to_string(&Response::Accepted(true)).unwrap();
        assert_eq!(json, r#"{"kind":"accepted","data":true}"#);

        let json = serde_json::to_string(&Response::Status(MonitorState::Inactive)).unwrap();
        assert_eq!(json, r#"{"kind":"status","data":"inactive"}"#);

        let json = serde_json::to_string(&Response::Entry(None)).unwrap();
        assert_eq!(json, r#"{"kind":"entry","data":null}"#);
    }

    #[test]
    fn test_error_response_decode() {
        let response: Response =
            serde_json::from_str(r#"{"kind":"error","data":{"message":"nope"}}"#).unwrap();
        assert_eq!(response, Response::error("nope"));
    }
}
