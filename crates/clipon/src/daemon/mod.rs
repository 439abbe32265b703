//! The clipon daemon.
//!
//! Two loops share one [`HistoryManager`]:
//!
//! - the capture loop pulls snippets from a [`CaptureSource`] and records
//!   them while monitoring is active;
//! - the service loop ([`server`]) answers client requests.
//!
//! Both go through [`Daemon`], a cloneable handle. Every store operation
//! takes the history mutex for its whole duration, so operations from the
//! two loops never interleave. The monitor state lives in a `watch` channel
//! so both loops notice a stop without polling.

pub mod lock;
pub mod server;

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureSource, ClipboardPoller};
use crate::config::Config;
use crate::error::Result;
use crate::history::{EntryView, HistoryManager};
use crate::options::{ConfigStore, OptionKey, OptionValue};
use crate::protocol::{DaemonInfo, Request, Response};
use crate::storage::PersistentHistory;

pub use lock::InstanceLock;

/// Whether captures are being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    /// Captures are recorded.
    Active,
    /// Captures are dropped.
    Inactive,
    /// The daemon is shutting down. Terminal.
    Stopped,
}

impl MonitorState {
    /// Whether this is the terminal state.
    #[must_use]
    pub fn is_stopped(self) -> bool {
        self == Self::Stopped
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Files the daemon reports in `info` but doesn't own through the store.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    /// Service socket.
    pub socket: PathBuf,
    /// Singleton lock file.
    pub lock_file: PathBuf,
}

#[derive(Debug)]
struct Shared {
    history: Mutex<HistoryManager>,
    state: watch::Sender<MonitorState>,
    paths: DaemonPaths,
}

/// Cloneable handle to the running daemon.
#[derive(Debug, Clone)]
pub struct Daemon {
    shared: Arc<Shared>,
}

impl Daemon {
    /// Wrap `history`, starting in `initial` state.
    #[must_use]
    pub fn new(history: HistoryManager, initial: MonitorState, paths: DaemonPaths) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            shared: Arc::new(Shared {
                history: Mutex::new(history),
                state,
                paths,
            }),
        }
    }

    /// Current monitor state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        *self.shared.state.borrow()
    }

    /// Watch the monitor state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.shared.state.subscribe()
    }

    /// Stop recording captures. Returns `false` once stopped.
    pub fn pause(&self) -> bool {
        self.transition(MonitorState::Inactive)
    }

    /// Resume recording captures. Returns `false` once stopped.
    pub fn resume(&self) -> bool {
        self.transition(MonitorState::Active)
    }

    /// Begin shutdown. Both loops end once they see the change.
    pub fn stop(&self) -> bool {
        self.transition(MonitorState::Stopped)
    }

    fn transition(&self, next: MonitorState) -> bool {
        let mut accepted = false;
        self.shared.state.send_if_modified(|state| {
            if state.is_stopped() {
                return false;
            }
            accepted = true;
            if *state == next {
                return false;
            }
            info!(from = %state, to = %next, "Monitor state changed");
            *state = next;
            true
        });
        accepted
    }

    fn history(&self) -> MutexGuard<'_, HistoryManager> {
        self.shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `text` if monitoring is active. Returns whether it was kept.
    pub fn record(&self, text: &str) -> bool {
        if self.state() != MonitorState::Active {
            debug!(len = text.len(), "Monitor inactive, dropping capture");
            return false;
        }
        self.history().add_text(text);
        true
    }

    /// Answer one client request.
    pub fn handle(&self, request: Request) -> Response {
        debug!(method = request.method(), "Handling request");
        match request {
            Request::GetStatus => Response::Status(self.state()),
            Request::Configure { key, value } => match self.configure(&key, &value) {
                Ok(()) => Response::Accepted(true),
                Err(e) => {
                    warn!(%key, %value, error = %e, "Rejected option change");
                    Response::Accepted(false)
                }
            },
            Request::GetInfo => Response::Info(Box::new(self.info())),
            Request::ClearHistory => {
                self.history().clear();
                Response::Done
            }
            Request::HistorySize => Response::Size(self.history().size()),
            Request::GetEntry { index } => {
                Response::Entry(self.history().get_entry(index).map(EntryView::from))
            }
            Request::DeleteRange { start, end } => {
                Response::Accepted(self.history().delete_range(start, end))
            }
            Request::SaveHistory => Response::Accepted(self.history().save_all()),
            Request::Pause => Response::Accepted(self.pause()),
            Request::Resume => Response::Accepted(self.resume()),
            Request::Stop => Response::Accepted(self.stop()),
        }
    }

    fn configure(&self, key: &str, value: &str) -> Result<()> {
        let key: OptionKey = key.parse()?;
        let value = OptionValue::parse(key, value)?;
        self.history().configure(value)
    }

    /// Daemon and history summary.
    #[must_use]
    pub fn info(&self) -> DaemonInfo {
        let state = self.state();
        let history = self.history();
        DaemonInfo {
            pid: std::process::id(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            state,
            socket: self.shared.paths.socket.clone(),
            lock_file: self.shared.paths.lock_file.clone(),
            options_file: history.options().path().to_path_buf(),
            history: history.info(),
        }
    }

    /// Pull captures from `source` until it is exhausted or the daemon stops.
    pub async fn capture_loop<S: CaptureSource>(self, mut source: S) {
        let mut state = self.subscribe();
        info!(source = source.name(), "Capture loop started");

        loop {
            if state.borrow_and_update().is_stopped() {
                break;
            }
            tokio::select! {
                capture = source.next_capture() => {
                    let Some(text) = capture else {
                        info!(source = source.name(), "Capture source exhausted");
                        break;
                    };
                    self.record(&text);
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Capture loop stopped");
    }

    /// Run both loops until a stop request, then clean up the socket.
    ///
    /// A panicked capture task is logged, not returned.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`.
    pub async fn run_until_stopped<S>(self, listener: UnixListener, source: S) -> Result<()>
    where
        S: CaptureSource + 'static,
    {
        let capture = tokio::spawn(self.clone().capture_loop(source));

        server::serve(listener, self.clone()).await;

        // The source may still be pending; make sure the capture loop sees
        // the stop even if the service loop ended for another reason.
        self.stop();
        if let Err(e) = capture.await {
            error!(error = %e, "Capture task failed");
        }

        server::remove_socket(&self.shared.paths.socket);
        Ok(())
    }
}

/// Start the daemon and block until it is stopped.
///
/// Startup order: directories, instance lock, runtime options, history,
/// socket. Any failure along the way is fatal and is returned before
/// anything is served.
///
/// # Errors
///
/// Returns an error if another instance holds the lock, a store file can't
/// be opened, the history index is unrecognized, or the socket can't be
/// bound.
pub async fn run(config: &Config) -> Result<()> {
    config.ensure_dirs()?;

    let mut instance = InstanceLock::acquire(config.lock_path())?;

    let options = ConfigStore::open(config.options_path())?;
    let store = PersistentHistory::open(config.data_log_path(), config.meta_path())?;
    let history = HistoryManager::open(store, options);

    let initial = if config.capture.start_active {
        MonitorState::Active
    } else {
        MonitorState::Inactive
    };
    let daemon = Daemon::new(
        history,
        initial,
        DaemonPaths {
            socket: config.socket_path(),
            lock_file: config.lock_path(),
        },
    );

    let listener = server::bind(&config.socket_path())?;
    let source = ClipboardPoller::new(config.poll_interval());

    spawn_signal_handler(daemon.clone());

    info!(
        pid = std::process::id(),
        socket = %config.socket_path().display(),
        state = %initial,
        "Daemon started"
    );

    let result = daemon.run_until_stopped(listener, source).await;

    instance.release();
    info!("Daemon stopped");
    result
}

fn spawn_signal_handler(daemon: Daemon) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received interrupt"),
                    _ = term.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                info!("Received interrupt");
            }
        }
        daemon.stop();
    });
}
