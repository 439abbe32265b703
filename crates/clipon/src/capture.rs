//! Capture sources.
//!
//! A [`CaptureSource`] yields clipboard text one snippet at a time. The
//! daemon's capture loop pulls from it and decides what to keep; sources know
//! nothing about history or pause state.

use std::time::Duration;

use async_trait::async_trait;
use clipboard_rs::{Clipboard, ClipboardContext};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Something that produces captured text.
#[async_trait]
pub trait CaptureSource: Send {
    /// The name of this capture source (for logging).
    fn name(&self) -> &'static str;

    /// Wait for the next captured snippet.
    ///
    /// Returns `None` once the source is exhausted and will produce nothing
    /// more.
    async fn next_capture(&mut self) -> Option<String>;
}

/// Polls the system clipboard and yields its text whenever it changes.
///
/// Whatever the clipboard holds when polling starts is taken as the baseline
/// and not reported. Non-text and empty contents are ignored.
#[derive(Debug)]
pub struct ClipboardPoller {
    ticker: Interval,
    last_hash: Option<blake3::Hash>,
    primed: bool,
    unavailable: bool,
}

impl ClipboardPoller {
    /// Create a poller that checks the clipboard every `poll_interval`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(
            interval_ms = poll_interval.as_millis(),
            "Created clipboard poller"
        );
        Self {
            ticker,
            last_hash: None,
            primed: false,
            unavailable: false,
        }
    }

    /// Read the current clipboard text.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard can't be opened.
    pub fn current_text() -> Result<Option<String>> {
        let ctx =
            ClipboardContext::new().map_err(|e| Error::capture_source("clipboard", e.to_string()))?;

        match ctx.get_text() {
            Ok(text) if !text.is_empty() => Ok(Some(text)),
            // Non-text content is not an error
            Ok(_) | Err(_) => Ok(None),
        }
    }

    /// Feed one clipboard reading through change detection.
    fn observe(&mut self, text: String) -> Option<String> {
        let hash = blake3::hash(text.as_bytes());
        if self.last_hash == Some(hash) {
            trace!("Clipboard content unchanged");
            return None;
        }
        self.last_hash = Some(hash);

        if !self.primed {
            self.primed = true;
            trace!("Clipboard baseline recorded");
            return None;
        }

        debug!(hash = %hash.to_hex(), len = text.len(), "New clipboard content detected");
        Some(text)
    }

    fn poll_once(&mut self) -> Option<String> {
        let reading = Self::current_text();
        if reading.is_ok() && self.unavailable {
            self.unavailable = false;
            debug!("Clipboard available again");
        }

        match reading {
            Ok(Some(text)) => self.observe(text),
            Ok(None) => {
                self.primed = true;
                None
            }
            // Reported once per outage
            Err(e) if self.unavailable => {
                trace!(error = %e, "Clipboard still unavailable");
                None
            }
            Err(e) => {
                warn!(error = %e, "Error checking clipboard");
                self.unavailable = true;
                None
            }
        }
    }
}

#[async_trait]
impl CaptureSource for ClipboardPoller {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    async fn next_capture(&mut self) -> Option<String> {
        loop {
            self.ticker.tick().await;
            if let Some(text) = self.poll_once() {
                return Some(text);
            }
        }
    }
}

/// A source fed through an mpsc channel.
///
/// Exhausted once every sender has been dropped and the buffer drained.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    #[must_use]
    pub fn channel(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

impl From<mpsc::Receiver<String>> for ChannelSource {
    fn from(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl CaptureSource for ChannelSource {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn next_capture(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}
