//! `clipon` - A lightweight clipboard history recorder
//!
//! A daemon watches the system clipboard and keeps every copied text in a
//! durable, append-only history. Short-lived client invocations query and
//! manage that history over a local socket.
//!
//! The layers, from the bottom up:
//!
//! - [`storage`]: the content log and its JSON index;
//! - [`history`]: the in-memory history and its retention policy;
//! - [`options`]: runtime options and their file;
//! - [`daemon`]: the capture and service loops around one history;
//! - [`client`] and [`protocol`]: the other end of the socket.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod capture;
pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod history;
pub mod logging;
pub mod options;
pub mod protocol;
pub mod storage;

pub use capture::{CaptureSource, ChannelSource, ClipboardPoller};
pub use client::Client;
pub use config::Config;
pub use daemon::{Daemon, MonitorState};
pub use error::{Error, Result};
pub use history::{Entry, HistoryManager};
pub use logging::init_logging;
pub use options::{ConfigStore, Limit, OptionKey, OptionValue};
pub use storage::PersistentHistory;
